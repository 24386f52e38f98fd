use tracing::info;

/// A yes/no prompt shown to the operator.
pub trait Confirmation: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
}

/// Fire-and-forget message to the operator.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Answers every prompt the same way; used for unattended runs.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirmation for AutoConfirm {
    fn confirm(&self, message: &str) -> bool {
        info!(prompt = %message, answer = self.0, "auto-confirming");
        self.0
    }
}
