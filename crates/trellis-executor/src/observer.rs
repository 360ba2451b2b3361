/// Hooks external observers may subscribe to.
///
/// The engine retains no storage responsibility; persistence and UI belong
/// to whoever implements this trait. Callbacks are invoked synchronously
/// from the scheduler loop, so implementations should be quick and must not
/// block.
pub trait RunObserver: Send + Sync {
  fn on_step_started(&self, _execution_id: &str, _step_id: &str) {}

  fn on_step_completed(&self, _execution_id: &str, _step_id: &str, _output: &serde_json::Value) {}

  fn on_step_skipped(&self, _execution_id: &str, _step_id: &str) {}

  fn on_step_failed(&self, _execution_id: &str, _step_id: &str, _error: &str) {}

  fn on_run_completed(&self, _execution_id: &str) {}

  fn on_run_failed(&self, _execution_id: &str, _step_id: &str) {}
}
