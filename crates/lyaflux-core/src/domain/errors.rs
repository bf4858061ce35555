use std::error::Error;
use std::fmt::{Display, Formatter};

pub type FluxResult<T> = Result<T, FluxError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FluxErrorCategory {
    DataShape,
    Arity,
    Underdetermined,
    Range,
    NotFound,
    Io,
}

impl FluxErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::DataShape => 2,
            Self::Arity => 3,
            Self::Underdetermined => 4,
            Self::Range => 5,
            Self::NotFound => 6,
            Self::Io => 7,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataShape => "DataShapeError",
            Self::Arity => "ArityError",
            Self::Underdetermined => "UnderdeterminedError",
            Self::Range => "RangeError",
            Self::NotFound => "NotFoundError",
            Self::Io => "IOError",
        }
    }
}

impl Display for FluxErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FluxError {
    category: FluxErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl FluxError {
    pub fn new(
        category: FluxErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn data_shape(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(FluxErrorCategory::DataShape, placeholder, message)
    }

    pub fn arity(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(FluxErrorCategory::Arity, placeholder, message)
    }

    pub fn underdetermined(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(FluxErrorCategory::Underdetermined, placeholder, message)
    }

    pub fn range(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(FluxErrorCategory::Range, placeholder, message)
    }

    pub fn not_found(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(FluxErrorCategory::NotFound, placeholder, message)
    }

    pub fn io(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(FluxErrorCategory::Io, placeholder, message)
    }

    pub const fn category(&self) -> FluxErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }
}

impl Display for FluxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for FluxError {}
