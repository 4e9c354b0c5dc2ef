#[derive(Debug, thiserror::Error)]
pub enum PdnsError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("capture device error: {0}")]
    Capture(String),
    #[error("DNS parse error at offset {offset}: {detail}")]
    DnsParse { offset: usize, detail: String },
    #[error("serialization error: {0}")]
    Serialization(#[source] std::io::Error),
    #[error("fatal: {0}")]
    Fatal(String),
}
