/// Top-level error type. Every pipeline stage and public entry point returns this.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unable to decode binary ({id}): {source}")]
    Binary {
        id: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Unrecognized document language: {0}")]
    Language(String),

    #[error("No image to save {id} ({path})")]
    EmptyImage { id: String, path: String },

    #[error("Default cover image unusable: {0}")]
    DefaultCover(String),

    #[error("Stage '{stage}' is scheduled before its requirement {missing} is available")]
    StageOrder { stage: String, missing: String },

    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed XML at byte {position}: {detail}")]
    Xml { position: u64, detail: String },

    #[error("Unknown charset label: {0}")]
    UnknownCharset(String),

    #[error("Source is not valid {encoding} text")]
    MalformedText { encoding: String },

    #[error("Missing root element")]
    Empty,

    #[error("Root element is <{0}>, not <FictionBook>")]
    NotFictionBook(String),

    #[error("Unable to read archive: {0}")]
    Archive(String),

    #[error(transparent)]
    Security(#[from] SecurityError),
}

/// Failures of a single image transform step. These never abort a job:
/// the normalizer logs them and stores the original bytes instead.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Unable to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Unable to encode image as {format}: {source}")]
    Encode {
        format: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Scaled size {width}x{height} is empty")]
    EmptyScale { width: u32, height: u32 },

    #[error("Unsupported image type for processing: {0}")]
    Unsupported(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Write failed for format {format}: {detail}")]
    WriteFailed { format: String, detail: String },

    #[error("No Kindle codec configured to produce {0}")]
    MissingCodec(String),

    #[error("Kindle codec failed: {0}")]
    Codec(String),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {detail}")]
    Invalid { path: String, detail: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Path traversal detected in archive entry: {path}")]
    PathTraversal { path: String },

    #[error("Resource {name} is {size_mb}MB, exceeding limit of {limit_mb}MB")]
    OversizedResource {
        name: String,
        size_mb: u64,
        limit_mb: u64,
    },

    #[error("XML nesting depth {depth} exceeds limit of {limit}")]
    ExcessiveNesting { depth: u32, limit: u32 },
}
