//! Device layer for the vacline stack.
//!
//! Combines the serial polling engine and the event-driven state
//! aggregation into the two device kinds operators actually see: the
//! [`SerialController`] that owns a serial line, and the [`IonPump`]
//! channel device that follows one pressure channel of a controller.

pub mod controller;
pub mod ion_pump;
pub mod properties;

pub use controller::SerialController;
pub use ion_pump::IonPump;
pub use properties::IonPumpProperties;
