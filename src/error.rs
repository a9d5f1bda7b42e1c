pub type DailiesResult<T> = Result<T, DailiesError>;

#[derive(thiserror::Error, Debug)]
pub enum DailiesError {
    #[error("config error: {0}")]
    Config(String),

    #[error("sequence error: {0}")]
    Sequence(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DailiesError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn sequence(msg: impl Into<String>) -> Self {
        Self::Sequence(msg.into())
    }

    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            DailiesError::config("x").to_string().contains("config error:")
        );
        assert!(
            DailiesError::sequence("x")
                .to_string()
                .contains("sequence error:")
        );
        assert!(DailiesError::image("x").to_string().contains("image error:"));
        assert!(
            DailiesError::encode("x").to_string().contains("encode error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = DailiesError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
