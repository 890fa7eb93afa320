/// Errors that can be shown to the author of a query. `user_message` is a
/// short hint when one exists; `technical_message` always describes the
/// failure in full.
pub trait UserError {
    fn code(&self) -> u32;
    fn user_message(&self) -> Option<String>;
    fn technical_message(&self) -> String;
}
