use crate::sensitive::SecretString;

/// A fixed token that never expires
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    pub fn new(token: impl Into<SecretString>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn get(&self) -> SecretString {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token_is_stable_and_redacted() {
        let token = StaticToken::new("hvs.static");
        assert_eq!(token.get().expose(), "hvs.static");
        assert_eq!(token.get(), token.get());
        assert!(!format!("{:?}", token).contains("hvs.static"));
    }
}
