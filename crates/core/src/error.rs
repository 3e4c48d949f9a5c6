use std::time::Duration;
use thiserror::Error;

pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("{integration} not configured. Set {fields} in config.json")]
    NotConfigured {
        integration: &'static str,
        fields: &'static str,
    },
    #[error("{message}")]
    InvalidArgument { field: String, message: String },
    #[error("{body}")]
    External { status: Option<u16>, body: String },
    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },
    #[error("{0}")]
    Missing(String),
    #[error("{0}")]
    Transport(String),
}

impl ToolError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn external(body: impl Into<String>) -> Self {
        Self::External {
            status: None,
            body: body.into(),
        }
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::External {
            status: Some(status),
            body: body.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured { .. } => ErrorKind::NotConfigured,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::External { .. } | Self::Transport(_) => ErrorKind::ExternalFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Missing(_) => ErrorKind::NotFound,
        }
    }

    /// Flattens the failure into the single-line text handed back to the agent.
    pub fn render(&self) -> String {
        let text = match self {
            Self::External {
                status: Some(code),
                body,
            } => format!("Error {}: {}", code, body),
            other => format!("Error: {}", other),
        };
        single_line(&text)
    }
}

fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotConfigured,
    InvalidArgument,
    ExternalFailure,
    Timeout,
    NotFound,
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
