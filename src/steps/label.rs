//! Label encoders for recognition and classification heads.

use crate::error::PipelineError;
use crate::record::{Field, Label, Record};
use crate::transform::Transform;
use rand::RngCore;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Dictionary used when no `character_dict_path` is configured
pub const DEFAULT_CHARACTERS: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

const PAD_TOKEN: &str = "<PAD>";
const GO_TOKEN: &str = "<GO>";
const STOP_TOKEN: &str = "<STOP>";
const UNKNOWN_TOKEN: &str = "<UNKNOWN>";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecLabelConfig {
    /// Fixed sequence length; 23 for CTC and 25 for attention heads when unset
    pub max_text_len: Option<usize>,
    /// One character per line
    pub character_dict_path: Option<PathBuf>,
    pub use_space_char: bool,
    /// CTC only: blank token after the characters instead of before
    pub blank_at_last: bool,
    /// Master only: map unknown characters to a dedicated token
    pub use_unknown_char: bool,
    pub lower: bool,
}

impl Default for RecLabelConfig {
    fn default() -> Self {
        Self {
            max_text_len: None,
            character_dict_path: None,
            use_space_char: false,
            blank_at_last: true,
            use_unknown_char: false,
            lower: false,
        }
    }
}

/// Characters of the configured dictionary, before special tokens
fn dictionary(path: Option<&Path>, use_space_char: bool) -> Result<Vec<String>, PipelineError> {
    let mut chars: Vec<String> = match path {
        Some(path) => std::fs::read_to_string(path)?
            .lines()
            .map(str::to_string)
            .collect(),
        None => DEFAULT_CHARACTERS.chars().map(String::from).collect(),
    };

    let has_space = chars.iter().any(|c| c == " ");
    if use_space_char && !has_space {
        chars.push(" ".to_string());
    } else if !use_space_char && has_space {
        warn!(
            "Dictionary {:?} contains a space although use_space_char is false",
            path
        );
    }
    Ok(chars)
}

/// Which special tokens frame the encoded sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Ctc,
    Attention,
    Master,
}

/// Encode a transcription into a fixed-length sequence of dictionary indices
#[derive(Debug, Clone)]
pub struct RecLabelEncode {
    name: &'static str,
    index: HashMap<char, u32>,
    num_classes: usize,
    max_text_len: usize,
    lower: bool,
    /// Written before the characters
    start: Option<u32>,
    /// Written after the characters
    stop: Option<u32>,
    /// Fills the sequence up to `max_text_len`
    pad: u32,
    unknown: Option<u32>,
}

impl RecLabelEncode {
    pub const CTC_NAME: &'static str = "RecCTCLabelEncode";
    pub const ATTN_NAME: &'static str = "RecAttnLabelEncode";
    pub const MASTER_NAME: &'static str = "RecMasterLabelEncode";

    /// Characters followed by blank padding
    pub fn ctc(config: RecLabelConfig) -> Result<Self, PipelineError> {
        Self::build(Scheme::Ctc, config)
    }

    /// `<GO>`, characters, `<STOP>`, then `<GO>` padding
    pub fn attn(config: RecLabelConfig) -> Result<Self, PipelineError> {
        Self::build(Scheme::Attention, config)
    }

    /// `<GO>`, characters, `<STOP>`, then `<PAD>` padding
    pub fn master(config: RecLabelConfig) -> Result<Self, PipelineError> {
        Self::build(Scheme::Master, config)
    }

    fn build(scheme: Scheme, config: RecLabelConfig) -> Result<Self, PipelineError> {
        let name = match scheme {
            Scheme::Ctc => Self::CTC_NAME,
            Scheme::Attention => Self::ATTN_NAME,
            Scheme::Master => Self::MASTER_NAME,
        };
        let max_text_len = config
            .max_text_len
            .unwrap_or(if scheme == Scheme::Ctc { 23 } else { 25 });
        if max_text_len == 0 {
            return Err(PipelineError::Configuration(format!(
                "{}: max_text_len must be positive",
                name
            )));
        }

        let path = config.character_dict_path.as_deref();
        let chars = dictionary(path, config.use_space_char)?;
        let num_valid = chars.len() as u32;
        // the built-in dictionary only has lower-case letters
        let lower = config.lower || path.is_none();

        let (mut tokens, start, stop, pad) = match scheme {
            Scheme::Ctc if config.blank_at_last => {
                let tokens: Vec<String> =
                    chars.into_iter().chain([PAD_TOKEN.to_string()]).collect();
                (tokens, None, None, num_valid)
            }
            Scheme::Ctc => {
                let tokens: Vec<String> =
                    [PAD_TOKEN.to_string()].into_iter().chain(chars).collect();
                (tokens, None, None, 0)
            }
            Scheme::Attention => {
                let tokens: Vec<String> = [GO_TOKEN, STOP_TOKEN]
                    .into_iter()
                    .map(String::from)
                    .chain(chars)
                    .collect();
                (tokens, Some(0), Some(1), 0)
            }
            Scheme::Master => {
                let tokens: Vec<String> = [GO_TOKEN, STOP_TOKEN, PAD_TOKEN]
                    .into_iter()
                    .map(String::from)
                    .chain(chars)
                    .collect();
                (tokens, Some(0), Some(1), 2)
            }
        };
        let unknown = if scheme == Scheme::Master && config.use_unknown_char {
            tokens.push(UNKNOWN_TOKEN.to_string());
            Some(tokens.len() as u32 - 1)
        } else {
            None
        };

        // later duplicates win; multi-character entries never match a char
        let mut index = HashMap::new();
        for (i, token) in tokens.iter().enumerate() {
            let mut it = token.chars();
            if let (Some(c), None) = (it.next(), it.next()) {
                index.insert(c, i as u32);
            }
        }

        Ok(Self {
            name,
            index,
            num_classes: tokens.len(),
            max_text_len,
            lower,
            start,
            stop,
            pad,
            unknown,
        })
    }

    /// Size of the output vocabulary including special tokens
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Dictionary indices of `text`.
    ///
    /// Empty for an empty label, a label longer than `max_text_len`, or one
    /// with no character in the dictionary. Unknown characters are skipped
    /// unless an unknown token is configured.
    pub fn char_indices(&self, text: &str) -> Vec<u32> {
        let len = text.chars().count();
        if len == 0 || len > self.max_text_len {
            return Vec::new();
        }
        let text = if self.lower {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        let indices: Vec<u32> = text
            .chars()
            .filter_map(|c| self.index.get(&c).copied().or(self.unknown))
            .collect();
        if indices.is_empty() {
            warn!("`{}` does not contain any character in the dictionary", text);
        }
        indices
    }

    /// Framed and padded sequence for `text`, with the number of encoded chars
    pub fn encode(&self, text: &str) -> (Vec<u32>, usize) {
        let indices = self.char_indices(text);
        let length = indices.len();
        let padding = self.max_text_len.saturating_sub(length);

        let seq = self
            .start
            .into_iter()
            .chain(indices)
            .chain(self.stop)
            .chain(std::iter::repeat(self.pad).take(padding))
            .collect();
        (seq, length)
    }
}

impl Transform for RecLabelEncode {
    fn name(&self) -> &'static str {
        self.name
    }

    fn required_fields(&self) -> &'static [Field] {
        &[Field::Label]
    }

    fn apply(&self, mut record: Record, _rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let text = match &record.label {
            Some(Label::Text(text)) => text.clone(),
            Some(Label::Class(_)) => {
                return Err(PipelineError::processing(
                    self.name,
                    "label is already a class index",
                ))
            }
            None => return Err(PipelineError::missing(self.name, Field::Label)),
        };

        let (seq, length) = self.encode(&text);
        let text_length = text.chars().count();
        let padding = self.max_text_len.saturating_sub(text_length);

        record.text_seq = Some(seq);
        record.length = Some(length);
        record.text_length = Some(text_length);
        record.text_padded = Some(format!("{}{}", text, " ".repeat(padding)));
        Ok(record)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClsLabelConfig {
    pub label_list: Vec<String>,
}

/// Replace a text label with its position in `label_list`
#[derive(Debug, Clone)]
pub struct ClsLabelEncode {
    labels: Vec<String>,
}

impl ClsLabelEncode {
    pub const NAME: &'static str = "ClsLabelEncode";

    pub fn new(config: ClsLabelConfig) -> Result<Self, PipelineError> {
        if config.label_list.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "{}: label_list must not be empty",
                Self::NAME
            )));
        }
        Ok(Self {
            labels: config.label_list,
        })
    }
}

impl Transform for ClsLabelEncode {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn required_fields(&self) -> &'static [Field] {
        &[Field::Label]
    }

    fn apply(&self, mut record: Record, _rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let class = match &record.label {
            Some(Label::Text(text)) => {
                self.labels.iter().position(|l| l == text).ok_or_else(|| {
                    PipelineError::processing(
                        Self::NAME,
                        format!("invalid label `{}`, expected one of {:?}", text, self.labels),
                    )
                })?
            }
            Some(Label::Class(class)) => *class,
            None => return Err(PipelineError::missing(Self::NAME, Field::Label)),
        };
        record.label = Some(Label::Class(class));
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::io::Write;

    fn ctc(config: RecLabelConfig) -> RecLabelEncode {
        RecLabelEncode::ctc(config).unwrap()
    }

    #[test]
    fn test_ctc_default_dictionary() {
        let stage = ctc(RecLabelConfig::default());
        assert_eq!(stage.num_classes(), 37);

        let mut rng = StdRng::seed_from_u64(0);
        let output = stage
            .apply(Record::default().with_label("Hi5"), &mut rng)
            .unwrap();

        let seq = output.text_seq.unwrap();
        assert_eq!(seq.len(), 23);
        assert_eq!(&seq[..4], &[17, 18, 5, 36]);
        assert!(seq[3..].iter().all(|&i| i == 36));
        assert_eq!(output.length, Some(3));
        assert_eq!(output.text_length, Some(3));
        let padded = format!("Hi5{}", " ".repeat(20));
        assert_eq!(output.text_padded.as_deref(), Some(padded.as_str()));
    }

    #[test]
    fn test_ctc_blank_first() {
        let stage = ctc(RecLabelConfig {
            blank_at_last: false,
            ..RecLabelConfig::default()
        });
        let (seq, length) = stage.encode("a");
        assert_eq!(length, 1);
        assert_eq!(seq[0], 11);
        assert!(seq[1..].iter().all(|&i| i == 0));
    }

    #[test]
    fn test_unknown_characters_are_skipped() {
        let stage = ctc(RecLabelConfig::default());
        assert_eq!(stage.char_indices("a-b"), vec![10, 11]);

        let mut rng = StdRng::seed_from_u64(0);
        let output = stage
            .apply(Record::default().with_label("a-b"), &mut rng)
            .unwrap();
        assert_eq!(output.length, Some(2));
        assert_eq!(output.text_length, Some(3));
    }

    #[test]
    fn test_overlong_label_encodes_empty() {
        let stage = ctc(RecLabelConfig::default());
        let (seq, length) = stage.encode(&"a".repeat(24));
        assert_eq!(length, 0);
        assert_eq!(seq, vec![36; 23]);
        assert!(stage.char_indices("").is_empty());
    }

    #[test]
    fn test_dictionary_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a\nb\nc").unwrap();
        let stage = ctc(RecLabelConfig {
            character_dict_path: Some(file.path().to_path_buf()),
            use_space_char: true,
            max_text_len: Some(5),
            ..RecLabelConfig::default()
        });

        // a, b, c, space, blank
        assert_eq!(stage.num_classes(), 5);
        assert_eq!(stage.encode("a b"), (vec![0, 3, 1, 4, 4], 3));
        // custom dictionaries keep case
        assert!(stage.char_indices("A").is_empty());
    }

    #[test]
    fn test_missing_dictionary_is_io_error() {
        let result = RecLabelEncode::ctc(RecLabelConfig {
            character_dict_path: Some(PathBuf::from("/nonexistent/dict.txt")),
            ..RecLabelConfig::default()
        });
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_attention_framing() {
        let stage = RecLabelEncode::attn(RecLabelConfig::default()).unwrap();
        let (seq, length) = stage.encode("ab");
        assert_eq!(length, 2);
        assert_eq!(seq.len(), 27);
        assert_eq!(&seq[..4], &[0, 12, 13, 1]);
        assert!(seq[4..].iter().all(|&i| i == 0));
    }

    #[test]
    fn test_master_unknown_token() {
        let stage = RecLabelEncode::master(RecLabelConfig {
            use_unknown_char: true,
            ..RecLabelConfig::default()
        })
        .unwrap();
        assert_eq!(stage.num_classes(), 40);

        let (seq, length) = stage.encode("a?");
        assert_eq!(length, 2);
        assert_eq!(&seq[..5], &[0, 13, 39, 1, 2]);
        assert_eq!(seq.len(), 27);
    }

    #[test]
    fn test_label_encoder_requires_text() {
        let stage = ctc(RecLabelConfig::default());
        let mut rng = StdRng::seed_from_u64(0);
        let mut record = Record::default();
        record.label = Some(Label::Class(1));
        assert!(matches!(
            stage.apply(record, &mut rng),
            Err(PipelineError::Processing { .. })
        ));
    }

    #[test]
    fn test_cls_label_encode() {
        let stage = ClsLabelEncode::new(ClsLabelConfig {
            label_list: vec!["0".to_string(), "180".to_string()],
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let output = stage
            .apply(Record::default().with_label("180"), &mut rng)
            .unwrap();
        assert_eq!(output.label, Some(Label::Class(1)));

        let invalid = stage.apply(Record::default().with_label("90"), &mut rng);
        assert!(matches!(invalid, Err(PipelineError::Processing { .. })));
    }

    #[test]
    fn test_cls_empty_label_list() {
        let result = ClsLabelEncode::new(ClsLabelConfig { label_list: vec![] });
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }
}
