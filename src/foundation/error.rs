pub type ReflowResult<T> = Result<T, ReflowError>;

#[derive(thiserror::Error, Debug)]
pub enum ReflowError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("binding error: {0}")]
    Binding(String),

    #[error("font error: {0}")]
    Font(String),

    #[error("atlas error: {0}")]
    Atlas(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReflowError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn binding(msg: impl Into<String>) -> Self {
        Self::Binding(msg.into())
    }

    pub fn font(msg: impl Into<String>) -> Self {
        Self::Font(msg.into())
    }

    pub fn atlas(msg: impl Into<String>) -> Self {
        Self::Atlas(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(ReflowError::parse("x").to_string().contains("parse error:"));
        assert!(
            ReflowError::binding("x")
                .to_string()
                .contains("binding error:")
        );
        assert!(ReflowError::font("x").to_string().contains("font error:"));
        assert!(ReflowError::atlas("x").to_string().contains("atlas error:"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ReflowError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
