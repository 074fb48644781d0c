//! Model persistence.
//!
//! Two encodings of the same payload:
//!
//! - native: [`MAGIC`] header with version, flags and a CRC32, followed by a
//!   Postcard payload (see [`native`])
//! - JSON: a [`JsonDocument`] with the payload under `model`
//!
//! Loading rejects missing fields, unknown versions or flags, checksum
//! failures and models whose learners, weights or trees are inconsistent.
//! A reloaded model predicts bit-identically.
//!
//! # Example
//!
//! ```
//! use appraise::model::EnsembleModel;
//!
//! let untrained = EnsembleModel::new();
//! let bytes = untrained.to_bytes().unwrap();
//! let back = EnsembleModel::from_bytes(&bytes).unwrap();
//! assert!(!back.is_trained());
//! ```

mod convert;
pub mod native;
mod payload;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub use native::{
    DeserializeError, FormatFlags, FormatHeader, NativeCodec, SerializeError, CURRENT_VERSION_MAJOR,
    CURRENT_VERSION_MINOR, HEADER_SIZE, MAGIC,
};
pub use payload::{
    ForestPayload, JsonDocument, LearnerPayload, Payload, PayloadV1, TreePayload, JSON_FORMAT_NAME,
};

use crate::model::EnsembleModel;

/// Errors from file-level persistence.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    Deserialize(#[from] DeserializeError),
}

fn header_for(model: &EnsembleModel) -> FormatHeader {
    let mut flags = FormatFlags::empty();
    if model.is_trained() {
        flags.set(FormatFlags::TRAINED);
    }
    if model.metrics().is_some() {
        flags.set(FormatFlags::HAS_METRICS);
    }
    let n_features = model.schema().map(|s| s.len()).unwrap_or(0);
    FormatHeader::new(flags, n_features as u32, model.n_learners() as u32)
}

fn check_header(header: &FormatHeader, payload: &PayloadV1) -> Result<(), DeserializeError> {
    let consistent = header.flags.contains(FormatFlags::TRAINED) == payload.trained
        && header.flags.contains(FormatFlags::HAS_METRICS) == payload.metrics.is_some()
        && header.num_features as usize == payload.feature_names.len()
        && header.num_learners as usize == payload.learners.len();
    if consistent {
        Ok(())
    } else {
        Err(DeserializeError::CorruptPayload("header does not match payload".into()))
    }
}

impl EnsembleModel {
    /// Encode in the native binary format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        NativeCodec::new().serialize(header_for(self), &Payload::V1(PayloadV1::from(self)))
    }

    /// Decode the native binary format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let (header, payload): (_, Payload) = NativeCodec::new().deserialize(bytes)?;
        let Payload::V1(payload) = payload;
        check_header(&header, &payload)?;
        let model = Self::try_from(payload)?;
        log::debug!(
            "loaded model v{}.{}: {} learners, {} features",
            header.version_major,
            header.version_minor,
            header.num_learners,
            header.num_features
        );
        Ok(model)
    }

    /// Encode as a pretty-printed JSON document.
    pub fn to_json(&self) -> Result<String, SerializeError> {
        let doc = JsonDocument {
            format: JSON_FORMAT_NAME.to_string(),
            version_major: CURRENT_VERSION_MAJOR,
            version_minor: CURRENT_VERSION_MINOR,
            model: PayloadV1::from(self),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Decode a JSON document.
    pub fn from_json(text: &str) -> Result<Self, DeserializeError> {
        let doc: JsonDocument = serde_json::from_str(text)?;
        if doc.format != JSON_FORMAT_NAME {
            return Err(DeserializeError::NotAModel);
        }
        if doc.version_major != CURRENT_VERSION_MAJOR {
            return Err(DeserializeError::UnsupportedVersion {
                major: doc.version_major,
                minor: doc.version_minor,
            });
        }
        let model = Self::try_from(doc.model)?;
        log::debug!("loaded JSON model: {} learners", model.n_learners());
        Ok(model)
    }

    /// Write the native format to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), SerializeError> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Read a model in either encoding from `reader`.
    ///
    /// Input starting with [`MAGIC`] is decoded as native, anything else as
    /// JSON.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, DeserializeError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        if bytes.starts_with(MAGIC) {
            Self::from_bytes(&bytes)
        } else {
            let text = std::str::from_utf8(&bytes).map_err(|_| DeserializeError::NotAModel)?;
            Self::from_json(text)
        }
    }

    /// Save to `path`: JSON for a `.json` extension, native otherwise.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path).map_err(SerializeError::Io)?);
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
            writer.write_all(self.to_json()?.as_bytes()).map_err(SerializeError::Io)?;
        } else {
            self.write_to(&mut writer)?;
        }
        writer.flush().map_err(SerializeError::Io)?;
        Ok(())
    }

    /// Load from `path` in either encoding.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(DeserializeError::Io)?;
        let model = Self::read_from(&mut BufReader::new(file))?;
        log::debug!("loaded model from {}", path.display());
        Ok(model)
    }
}
