//! `{ "ts": [...], "<field>": [...] }` documents, one index-aligned array per field.
//! Writes are not atomic; a torn file loads as corrupt.

use std::{collections::BTreeMap, fs, io, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{buffer::TimeBuffer, Error, FieldKey, Fields, Result, Sample, Time};

const TIME_KEY: &str = "ts";

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    ts: Vec<Time>,
    #[serde(flatten)]
    fields: BTreeMap<FieldKey, Vec<Option<f64>>>,
}
impl Document {
    fn from_buffer(buffer: &TimeBuffer) -> Self {
        let samples = buffer.samples();
        let ts = samples.iter().map(|sample| sample.time).collect();
        let fields = buffer
            .field_keys()
            .into_iter()
            .map(|key| {
                let column = samples
                    .iter()
                    .map(|sample| sample.fields.get(&key).copied())
                    .collect();
                (key, column)
            })
            .collect();
        Self { ts, fields }
    }

    fn into_samples(self) -> std::result::Result<Vec<Sample>, String> {
        let len = self.ts.len();
        if let Some((key, column)) = self.fields.iter().find(|(_, column)| column.len() != len) {
            return Err(format!(
                "field `{key}` has {} values but `{TIME_KEY}` has {len}",
                column.len()
            ));
        }
        let samples = self
            .ts
            .into_iter()
            .enumerate()
            .map(|(i, time)| {
                let fields: Fields = self
                    .fields
                    .iter()
                    .filter_map(|(key, column)| column[i].map(|value| (key.clone(), value)))
                    .collect();
                Sample::new(time, fields)
            })
            .collect();
        Ok(samples)
    }
}

pub fn save(buffer: &TimeBuffer, path: &Path) -> Result<()> {
    let doc = Document::from_buffer(buffer);
    let persist_err = |source| Error::Persist {
        path: path.to_owned(),
        source,
    };
    let bytes = serde_json::to_vec(&doc).map_err(|e| persist_err(io::Error::other(e)))?;
    fs::write(path, bytes).map_err(persist_err)?;
    debug!(path = %path.display(), samples = buffer.len(), "saved");
    Ok(())
}

/// Reads a buffer back from `path`; a missing file is an empty buffer.
pub fn load(path: &Path) -> Result<TimeBuffer> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no data file, starting empty");
            return Ok(TimeBuffer::new());
        }
        Err(e) => return Err(e.into()),
    };
    let corrupt = |reason: String| Error::CorruptData {
        path: path.to_owned(),
        reason,
    };
    let doc: Document = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
    let samples = doc.into_samples().map_err(corrupt)?;
    debug!(path = %path.display(), samples = samples.len(), "loaded");
    Ok(TimeBuffer::from_samples(samples))
}
