//! Detection label parsing.
//!
//! Labels are a JSON array of `{"transcription": ..., "points": [[x, y], ...]}`
//! objects, one per text instance.

use crate::error::PipelineError;
use crate::geometry::Polygon;
use crate::record::Annotations;
use serde::Deserialize;

/// Transcriptions marking illegible or unlabeled instances
const IGNORE_MARKERS: [&str; 2] = ["###", "*"];

#[derive(Debug, Deserialize)]
struct LabelEntry {
    transcription: String,
    points: Vec<[f32; 2]>,
}

/// Parse one detection label into aligned annotations
pub fn parse_det_label(json: &str) -> Result<Annotations, PipelineError> {
    let entries: Vec<LabelEntry> = serde_json::from_str(json)
        .map_err(|e| PipelineError::Configuration(format!("invalid detection label: {}", e)))?;

    let mut annotations = Annotations::default();
    for entry in entries {
        annotations
            .ignore_tags
            .push(IGNORE_MARKERS.contains(&entry.transcription.as_str()));
        annotations.polys.push(Polygon::new(entry.points));
        annotations.texts.push(entry.transcription);
    }
    Ok(annotations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label() {
        let annotations = parse_det_label(
            r####"[
                {"transcription": "EXIT", "points": [[10, 10], [50, 10], [50, 40], [10, 40]]},
                {"transcription": "###", "points": [[60, 5], [80, 5], [80, 15]]}
            ]"####,
        )
        .unwrap();

        assert_eq!(annotations.texts, vec!["EXIT", "###"]);
        assert_eq!(annotations.ignore_tags, vec![false, true]);
        assert_eq!(annotations.polys[0].len(), 4);
        assert_eq!(annotations.polys[1].points()[2], [80.0, 15.0]);
    }

    #[test]
    fn test_parse_empty_label() {
        let annotations = parse_det_label("[]").unwrap();
        assert!(annotations.polys.is_empty());
    }

    #[test]
    fn test_parse_invalid_label() {
        assert!(parse_det_label(r#"[{"points": []}]"#).is_err());
    }
}
