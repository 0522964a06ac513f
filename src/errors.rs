use failure::Fail;

#[derive(Debug, Fail)]
pub enum IntentEngineError {
    #[fail(display = "Unable to read model file '{}'", _0)]
    ModelLoad(String),
    #[fail(display = "Invalid entity name: '{}'", _0)]
    InvalidEntityName(String),
    #[fail(display = "Unbalanced parentheses in template line")]
    UnbalancedParentheses,
    #[fail(display = "Unknown template file extension: '{}'", _0)]
    UnknownFileExtension(String),
    #[fail(display = "Training subprocess failed with exit code {}", _0)]
    SubprocessFailure(i32),
    #[fail(display = "Invalid training arguments")]
    InvalidTrainingArgs,
}

pub type Result<T> = ::std::result::Result<T, ::failure::Error>;
