pub mod desktop;
pub mod tokio_timer;

pub use desktop::DesktopNotifier;
pub use tokio_timer::TokioTimerGateway;
