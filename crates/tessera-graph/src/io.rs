//! Artifact I/O
//!
//! Encoding, decoding, loading and atomic writing of graph artifacts.
//!
//! Binary artifacts start with the 8-byte magic `TSRGRAPH` and a little-endian
//! `u32` format version, followed by the bincode-encoded model. JSON artifacts
//! wrap the model in `{"format_version": .., "model": ..}`. The format is
//! chosen from the file extension on write and sniffed from the bytes on read.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GraphError, GraphResult};
use crate::proto::ModelProto;
use crate::validate::validate_model;
use crate::{ARTIFACT_EXTENSION, FORMAT_VERSION};

/// Leading bytes of a binary artifact.
pub const MAGIC: &[u8; 8] = b"TSRGRAPH";

// =============================================================================
// Formats
// =============================================================================

/// On-disk encoding of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArtifactFormat {
    /// Magic header plus bincode payload.
    #[default]
    Binary,
    /// Pretty-printed JSON envelope.
    Json,
}

impl ArtifactFormat {
    /// Picks the format from a path: `.json` is JSON, everything else binary.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ArtifactFormat::Json,
            _ => ArtifactFormat::Binary,
        }
    }

    /// Format name.
    pub fn name(self) -> &'static str {
        match self {
            ArtifactFormat::Binary => "binary",
            ArtifactFormat::Json => "json",
        }
    }
}

#[derive(Serialize)]
struct JsonEnvelope<'a> {
    format_version: u32,
    model: &'a ModelProto,
}

#[derive(Deserialize)]
struct JsonEnvelopeOwned {
    format_version: u32,
    model: ModelProto,
}

/// Path of the artifact for `name` inside `dir`.
pub fn artifact_path(dir: impl AsRef<Path>, name: &str) -> PathBuf {
    dir.as_ref().join(format!("{name}.{ARTIFACT_EXTENSION}"))
}

// =============================================================================
// Encoding
// =============================================================================

/// Encodes a model. Identical models always encode to identical bytes.
pub fn encode_model(model: &ModelProto, format: ArtifactFormat) -> GraphResult<Vec<u8>> {
    match format {
        ArtifactFormat::Binary => {
            let payload =
                bincode::serialize(model).map_err(|e| GraphError::Serialization(e.to_string()))?;
            let mut bytes = Vec::with_capacity(MAGIC.len() + 4 + payload.len());
            bytes.extend_from_slice(MAGIC);
            bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
            bytes.extend_from_slice(&payload);
            Ok(bytes)
        }
        ArtifactFormat::Json => serde_json::to_vec_pretty(&JsonEnvelope {
            format_version: FORMAT_VERSION,
            model,
        })
        .map_err(|e| GraphError::Serialization(e.to_string())),
    }
}

fn check_version(found: u32) -> GraphResult<()> {
    if found == 0 || found > FORMAT_VERSION {
        return Err(GraphError::UnsupportedFormatVersion {
            found,
            supported: FORMAT_VERSION,
        });
    }
    Ok(())
}

fn decode_unchecked(bytes: &[u8]) -> GraphResult<(ModelProto, u32)> {
    if let Some(rest) = bytes.strip_prefix(MAGIC.as_slice()) {
        let header: [u8; 4] = rest
            .get(..4)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| GraphError::Malformed("truncated header".to_string()))?;
        let version = u32::from_le_bytes(header);
        check_version(version)?;
        let model: ModelProto = bincode::deserialize(&rest[4..])?;
        return Ok((model, version));
    }

    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    if first == Some(&b'{') {
        let envelope: JsonEnvelopeOwned = serde_json::from_slice(bytes)
            .map_err(|e| GraphError::Malformed(format!("JSON parse error: {e}")))?;
        check_version(envelope.format_version)?;
        return Ok((envelope.model, envelope.format_version));
    }

    Err(GraphError::Malformed(
        "not a graph artifact (missing header)".to_string(),
    ))
}

/// Decodes and validates a model from artifact bytes.
pub fn decode_model(bytes: &[u8]) -> GraphResult<ModelProto> {
    let (model, _) = decode_unchecked(bytes)?;
    validate_model(&model)?;
    Ok(model)
}

// =============================================================================
// Reading
// =============================================================================

/// Reads and validates a model from a file.
pub fn read_model(path: impl AsRef<Path>) -> GraphResult<ModelProto> {
    LoadedGraph::load(path).map(LoadedGraph::into_model)
}

/// Entry point for reading artifacts by path or by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphLoader;

impl GraphLoader {
    /// Loads the artifact at `path`.
    pub fn load(path: impl AsRef<Path>) -> GraphResult<LoadedGraph> {
        LoadedGraph::load(path)
    }

    /// Loads `<dir>/<name>.graph`.
    pub fn load_named(dir: impl AsRef<Path>, name: &str) -> GraphResult<LoadedGraph> {
        LoadedGraph::load(artifact_path(dir, name))
    }
}

/// A validated artifact loaded from storage.
///
/// The loaded model is never handed out mutably; [`LoadedGraph::working_copy`]
/// produces an owned deep copy for rewriting.
#[derive(Debug, Clone)]
pub struct LoadedGraph {
    path: PathBuf,
    model: ModelProto,
    format_version: u32,
    byte_len: usize,
}

impl LoadedGraph {
    /// Loads an artifact, failing with a load error if it is missing,
    /// malformed, of an unsupported version, or structurally invalid.
    pub fn load(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| GraphError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let (model, format_version) = decode_unchecked(&bytes)?;
        validate_model(&model)?;

        info!(
            path = %path.display(),
            format_version,
            nodes = model.graph.node.len(),
            initializers = model.graph.initializer.len(),
            "loaded graph artifact"
        );

        Ok(Self {
            path: path.to_path_buf(),
            model,
            format_version,
            byte_len: bytes.len(),
        })
    }

    /// The loaded model.
    pub fn model(&self) -> &ModelProto {
        &self.model
    }

    /// Returns an independent deep copy of the model.
    pub fn working_copy(&self) -> ModelProto {
        self.model.clone()
    }

    /// Path the artifact was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format version recorded in the artifact.
    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Size of the artifact in bytes.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Consumes the handle and returns the model.
    pub fn into_model(self) -> ModelProto {
        self.model
    }
}

// =============================================================================
// Writing
// =============================================================================

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// Final artifact path.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: usize,
    /// Encoding used.
    pub format: ArtifactFormat,
}

/// Writes a model, choosing the format from the path's extension.
pub fn write_model(model: &ModelProto, path: impl AsRef<Path>) -> GraphResult<WriteReport> {
    let path = path.as_ref();
    write_model_as(model, path, ArtifactFormat::from_path(path))
}

/// Writes a model atomically: the bytes go to a temporary file in the target
/// directory which is synced and then renamed over `path`. A failure leaves
/// any previous artifact at `path` untouched.
pub fn write_model_as(
    model: &ModelProto,
    path: impl AsRef<Path>,
    format: ArtifactFormat,
) -> GraphResult<WriteReport> {
    let path = path.as_ref();
    let write_err = |source: std::io::Error| GraphError::Write {
        path: path.to_path_buf(),
        source,
    };

    let bytes = encode_model(model, format)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(write_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tessera-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(write_err)?;
    tmp.write_all(&bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    debug!(tmp = %tmp.path().display(), bytes = bytes.len(), "staged artifact");

    tmp.persist(path).map_err(|e| write_err(e.error))?;

    info!(path = %path.display(), bytes = bytes.len(), format = format.name(), "wrote graph artifact");

    Ok(WriteReport {
        path: path.to_path_buf(),
        bytes: bytes.len(),
        format,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{
        ElementType, GraphProto, NodeProto, OperatorSetId, TensorDescriptor, TensorProto,
        TensorShape,
    };
    use crate::{IR_VERSION, OPSET_VERSION};

    fn sample_model() -> ModelProto {
        let mut graph = GraphProto::new("tiny");
        graph.input.push(TensorDescriptor::new(
            "x",
            ElementType::Float,
            TensorShape::with_dynamic_batch(&[1, 2], "batch_size"),
        ));
        graph.initializer.push(TensorProto::float("w", &[2, 2], vec![0.5, -1.0, 2.0, 0.25]));
        graph.node.push(NodeProto::new("MatMul", &["x", "w"], &["y"]).with_name("mm"));
        graph.output.push(TensorDescriptor::new(
            "y",
            ElementType::Float,
            TensorShape::with_dynamic_batch(&[1, 2], "batch_size"),
        ));
        ModelProto {
            ir_version: IR_VERSION,
            opset_import: vec![OperatorSetId {
                domain: String::new(),
                version: OPSET_VERSION,
            }],
            producer_name: "tessera".into(),
            producer_version: "0.1.0".into(),
            model_version: 1,
            doc_string: None,
            graph,
            metadata_props: Vec::new(),
        }
    }

    #[test]
    fn test_binary_encoding_is_deterministic() {
        let model = sample_model();
        let a = encode_model(&model, ArtifactFormat::Binary).unwrap();
        let b = encode_model(&model.clone(), ArtifactFormat::Binary).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with(MAGIC));
        assert_eq!(decode_model(&a).unwrap(), model);
    }

    #[test]
    fn test_json_decoding() {
        let model = sample_model();
        let bytes = encode_model(&model, ArtifactFormat::Json).unwrap();
        assert_eq!(bytes[0], b'{');
        assert_eq!(decode_model(&bytes).unwrap(), model);
    }

    #[test]
    fn test_future_version_rejected() {
        let mut bytes = encode_model(&sample_model(), ArtifactFormat::Binary).unwrap();
        bytes[8..12].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        let err = decode_model(&bytes).unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedFormatVersion { .. }));
        assert!(err.is_load_error());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(decode_model(b"hello"), Err(GraphError::Malformed(_))));
        let mut bytes = encode_model(&sample_model(), ArtifactFormat::Binary).unwrap();
        bytes.truncate(20);
        assert!(matches!(decode_model(&bytes), Err(GraphError::Malformed(_))));
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact_path(dir.path(), "model_prequantized");
        assert!(path.ends_with("model_prequantized.graph"));

        let report = write_model(&sample_model(), &path).unwrap();
        assert_eq!(report.format, ArtifactFormat::Binary);
        assert_eq!(report.bytes, fs::metadata(&path).unwrap().len() as usize);

        let loaded = LoadedGraph::load(&path).unwrap();
        assert_eq!(loaded.format_version(), FORMAT_VERSION);
        assert_eq!(loaded.model(), &sample_model());

        let mut copy = loaded.working_copy();
        copy.graph.initializer[0].name = "changed".into();
        assert_eq!(loaded.model().graph.initializer[0].name, "w");

        let by_name = GraphLoader::load_named(dir.path(), "model_prequantized").unwrap();
        assert_eq!(by_name.byte_len(), report.bytes);
    }

    #[test]
    fn test_overwrite_replaces_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.graph");
        write_model(&sample_model(), &path).unwrap();
        let mut second = sample_model();
        second.model_version = 2;
        write_model(&second, &path).unwrap();
        assert_eq!(read_model(&path).unwrap().model_version, 2);

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = LoadedGraph::load("/definitely/not/here.graph").unwrap_err();
        assert!(matches!(err, GraphError::Read { .. }));
    }

    #[test]
    fn test_invalid_graph_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.graph");
        let mut model = sample_model();
        model.graph.node[0].input[1] = "missing".into();
        let bytes = encode_model(&model, ArtifactFormat::Binary).unwrap();
        fs::write(&path, bytes).unwrap();
        assert!(matches!(LoadedGraph::load(&path), Err(GraphError::Validation(_))));
    }

    #[test]
    fn test_overflowing_dims_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overflow.graph");
        let mut model = sample_model();
        model.graph.initializer.push(TensorProto::float("huge", &[1 << 32, 1 << 32], vec![]));
        let bytes = encode_model(&model, ArtifactFormat::Binary).unwrap();
        fs::write(&path, bytes).unwrap();

        let err = LoadedGraph::load(&path).unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)), "{err}");
        assert!(err.is_load_error());
    }

    #[test]
    fn test_failed_write_keeps_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.graph");
        write_model(&sample_model(), &path).unwrap();
        let before = fs::read(&path).unwrap();

        // A non-empty directory at the target cannot be replaced by a rename.
        let blocked = dir.path().join("blocked.graph");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("keep"), b"x").unwrap();
        let err = write_model(&sample_model(), &blocked).unwrap_err();
        assert!(matches!(err, GraphError::Write { .. }), "{err}");

        // A regular file where the parent directory should be.
        let err = write_model(&sample_model(), path.join("nested.graph")).unwrap_err();
        assert!(matches!(err, GraphError::Write { .. }), "{err}");

        assert_eq!(fs::read(&path).unwrap(), before);
        let staged: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".tessera-"))
            .collect();
        assert!(staged.is_empty(), "leftover temp files: {staged:?}");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ArtifactFormat::from_path(Path::new("a.json")), ArtifactFormat::Json);
        assert_eq!(ArtifactFormat::from_path(Path::new("a.graph")), ArtifactFormat::Binary);
    }
}
