//! Progress indicators and spinners.

use indicatif::{ProgressBar, ProgressStyle};
use rotor_engine::RotationState;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Create a spinner for long-running operations.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Keep a spinner's message in step with a rotation's state.
///
/// The task ends once the state is terminal or the sender is dropped.
pub fn follow_state(pb: ProgressBar, prefix: String, mut rx: watch::Receiver<RotationState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let state = *rx.borrow_and_update();
            pb.set_message(format!("{} [{}]", prefix, state));
            if state.is_terminal() || rx.changed().await.is_err() {
                break;
            }
        }
    })
}
