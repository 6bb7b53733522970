//! Bus topic namespace and payload literals.
//!
//! | Topic | Direction | Payload values |
//! |---|---|---|
//! | [`DOOR_STATE`] | engine → bus | `ABIERTA` \| `CERRADA` |
//! | [`WINDOW_STATE`] | engine → bus | `ABIERTA` \| `CERRADA` |
//! | [`SECURITY_CONTROL`] | bus → engine | `ACTIVAR` \| other |
//! | [`SECURITY_STATUS`] | engine → bus | `ACTIVADO` \| `DESACTIVADO` |
//! | [`ALARM_CONTROL`] | bus → engine | `APAGAR` \| other |
//! | [`ALARM_STATUS`] | engine → bus | `ON` \| `OFF` |
//!
//! Every engine → bus topic is published retained.

/// Door sensor state.
pub const DOOR_STATE: &str = "casa/puertas";
/// Window sensor state.
pub const WINDOW_STATE: &str = "casa/ventanas";
/// Arm / disarm command from dashboards.
pub const SECURITY_CONTROL: &str = "sistema/control/seguridad";
/// Arming mode echo.
pub const SECURITY_STATUS: &str = "sistema/estado/seguridad";
/// Alarm silence command from dashboards.
pub const ALARM_CONTROL: &str = "sistema/control/alarma";
/// Alarm status echo.
pub const ALARM_STATUS: &str = "sistema/estado/alarma";

/// Topics the bridge listens on.
pub const CONTROL_TOPICS: [&str; 2] = [SECURITY_CONTROL, ALARM_CONTROL];

// Payload literals
pub const OPEN: &str = "ABIERTA";
pub const CLOSED: &str = "CERRADA";
pub const ARM_COMMAND: &str = "ACTIVAR";
pub const SILENCE_COMMAND: &str = "APAGAR";
pub const ARMED: &str = "ACTIVADO";
pub const DISARMED: &str = "DESACTIVADO";
pub const ALARM_ON: &str = "ON";
pub const ALARM_OFF: &str = "OFF";

/// Fixed acknowledgement returned to every device report.
pub const DEVICE_ACK: &str = "ok";
