//! Pipeline configuration and the stage-name lookup.
//!
//! A config lists stages as single-key maps, `{"<Name>": {params}}`, in
//! application order. Names without an implementation are skipped so that
//! configs shared with other tooling keep working.

use crate::error::PipelineError;
use crate::steps::color::ColorAdjustConfig;
use crate::steps::crop::CropConfig;
use crate::steps::decode::DecodeConfig;
use crate::steps::label::{ClsLabelConfig, RecLabelConfig};
use crate::steps::normalize::NormalizeConfig;
use crate::steps::pack::PackConfig;
use crate::steps::rec_resize::{RecResizeConfig, RotateConfig};
use crate::steps::resize::{GridResizeConfig, RandomScaleConfig, ScalePadConfig};
use crate::steps::{
    ClsLabelEncode, DecodeImage, GridResize, NormalizeImage, PackLoaderInputs, RandomColorAdjust,
    RandomCropWithBBox, RandomScale, RecLabelEncode, RecResizeImg, RecResizeNormForInfer,
    Rotate90IfVertical, ScalePadImage, ToCHWImage,
};
use crate::transform::Transform;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

/// One configured stage: its registered name and raw parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct StageConfig {
    pub name: String,
    pub params: Value,
}

impl StageConfig {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl TryFrom<Map<String, Value>> for StageConfig {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(format!(
                "each transform entry needs exactly one name, got {:?}",
                map.keys().collect::<Vec<_>>()
            ));
        }
        let (name, params) = map.into_iter().next().ok_or("empty transform entry")?;
        Ok(Self { name, params })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    pub transforms: Vec<StageConfig>,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json).map_err(|e| PipelineError::Configuration(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// A built stage: either a transform or the terminal output packer
#[derive(Debug)]
pub enum Stage {
    Transform(Box<dyn Transform>),
    Output(PackLoaderInputs),
}

fn params<T: DeserializeOwned>(config: &StageConfig) -> Result<T, PipelineError> {
    let value = match &config.params {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(value)
        .map_err(|e| PipelineError::Configuration(format!("{}: {}", config.name, e)))
}

fn boxed<T: Transform + 'static>(stage: T) -> Option<Stage> {
    Some(Stage::Transform(Box::new(stage)))
}

/// Construct the stage registered under `config.name`.
///
/// Returns `Ok(None)` for names with no implementation.
pub fn build_stage(config: &StageConfig) -> Result<Option<Stage>, PipelineError> {
    let stage = match config.name.as_str() {
        "DecodeImage" => boxed(DecodeImage::new(params::<DecodeConfig>(config)?)),
        "NormalizeImage" => boxed(NormalizeImage::new(params::<NormalizeConfig>(config)?)?),
        "ToCHWImage" => boxed(ToCHWImage),
        "ScalePadImage" => boxed(ScalePadImage::new(params::<ScalePadConfig>(config)?)?),
        "GridResize" => boxed(GridResize::new(params::<GridResizeConfig>(config)?)?),
        "RandomScale" => boxed(RandomScale::new(params::<RandomScaleConfig>(config)?)?),
        "RandomCropWithBBox" => boxed(RandomCropWithBBox::new(params::<CropConfig>(config)?)?),
        "RandomColorAdjust" => boxed(RandomColorAdjust::new(params::<ColorAdjustConfig>(config)?)?),
        "RecResizeImg" => boxed(RecResizeImg::new(params::<RecResizeConfig>(config)?)?),
        "SVTRRecResizeImg" => boxed(RecResizeImg::svtr(params::<RecResizeConfig>(config)?)?),
        "RecResizeNormForInfer" => boxed(RecResizeNormForInfer::new(params(config)?)?),
        "Rotate90IfVertical" => boxed(Rotate90IfVertical::new(params::<RotateConfig>(config)?)?),
        "RecCTCLabelEncode" => boxed(RecLabelEncode::ctc(params::<RecLabelConfig>(config)?)?),
        "RecAttnLabelEncode" => boxed(RecLabelEncode::attn(params::<RecLabelConfig>(config)?)?),
        "RecMasterLabelEncode" => boxed(RecLabelEncode::master(params::<RecLabelConfig>(config)?)?),
        "ClsLabelEncode" => boxed(ClsLabelEncode::new(params::<ClsLabelConfig>(config)?)?),
        "PackLoaderInputs" => Some(Stage::Output(PackLoaderInputs::new(params::<PackConfig>(
            config,
        )?)?)),
        other => {
            tracing::debug!("Skipping unsupported transform '{}'", other);
            None
        }
    };
    Ok(stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_config() {
        let config = PipelineConfig::from_json(
            r#"{"transforms": [
                {"DecodeImage": {"img_mode": "RGB"}},
                {"ToCHWImage": null}
            ]}"#,
        )
        .unwrap();
        assert_eq!(config.transforms.len(), 2);
        assert_eq!(config.transforms[0].name, "DecodeImage");
        assert_eq!(config.transforms[1].params, Value::Null);
    }

    #[test]
    fn test_entry_with_two_names_rejected() {
        let result = PipelineConfig::from_json(
            r#"{"transforms": [{"DecodeImage": {}, "ToCHWImage": {}}]}"#,
        );
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_unknown_stage_is_skipped() {
        let stage = build_stage(&StageConfig::new("DetLabelEncode", json!({}))).unwrap();
        assert!(stage.is_none());
    }

    #[test]
    fn test_defaults_from_null_params() {
        let stage = build_stage(&StageConfig::new("RandomCropWithBBox", Value::Null)).unwrap();
        assert!(matches!(stage, Some(Stage::Transform(t)) if t.name() == "RandomCropWithBBox"));
    }

    #[test]
    fn test_bad_params_are_configuration_errors() {
        let missing = build_stage(&StageConfig::new("ScalePadImage", json!({})));
        assert!(matches!(missing, Err(PipelineError::Configuration(_))));

        let invalid = build_stage(&StageConfig::new(
            "NormalizeImage",
            json!({"mean": "unknown"}),
        ));
        assert!(matches!(invalid, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_recognition_stages_are_registered() {
        let entries = [
            ("RecResizeImg", json!({"image_shape": [32, 100]})),
            ("SVTRRecResizeImg", json!({"image_shape": [48, 320]})),
            ("RecResizeNormForInfer", json!({"target_height": 48})),
            ("Rotate90IfVertical", json!({"threshold": 2.0})),
            ("RecCTCLabelEncode", json!({"max_text_len": 25, "use_space_char": true})),
            ("RecAttnLabelEncode", Value::Null),
            ("RecMasterLabelEncode", json!({"use_unknown_char": true})),
            ("ClsLabelEncode", json!({"label_list": ["0", "180"]})),
        ];
        for (name, params) in entries {
            let stage = build_stage(&StageConfig::new(name, params)).unwrap();
            assert!(
                matches!(&stage, Some(Stage::Transform(t)) if t.name() == name),
                "{} was not built",
                name
            );
        }

        let bad = build_stage(&StageConfig::new(
            "Rotate90IfVertical",
            json!({"direction": "sideways"}),
        ));
        assert!(matches!(bad, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_pack_stage_is_output() {
        let stage = build_stage(&StageConfig::new(
            "PackLoaderInputs",
            json!({"output_columns": ["image", "polys"]}),
        ))
        .unwrap();
        assert!(matches!(stage, Some(Stage::Output(p)) if p.columns().len() == 2));
    }
}
