use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("Translation configuration error: {0}")]
    ConfigError(String),

    #[error("Translation service returned status {status}: {message}")]
    ServiceError { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
}
