use std::fmt;

/// Top-level device status reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceStatus {
    /// Network listener not started yet.
    #[default]
    NotStarted,
    /// No datagram from the phone within the contact timeout.
    ConnectionDead,
    /// The phone is reachable but no valid samples arrive.
    NoData,
    /// The listener failed to start. Sticky for the session.
    InitFailed,
    Ok,
}

impl DeviceStatus {
    /// Stable code exchanged across the host boundary.
    pub const fn code(self) -> u32 {
        match self {
            DeviceStatus::Ok => 0,
            DeviceStatus::ConnectionDead => 0x8301_0001,
            DeviceStatus::NoData => 0x8301_0002,
            DeviceStatus::InitFailed => 0x8301_0003,
            DeviceStatus::NotStarted => 0x8301_0005,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        [
            DeviceStatus::Ok,
            DeviceStatus::ConnectionDead,
            DeviceStatus::NoData,
            DeviceStatus::InitFailed,
            DeviceStatus::NotStarted,
        ]
        .into_iter()
        .find(|status| status.code() == code)
    }

    pub fn is_ok(self) -> bool {
        self == DeviceStatus::Ok
    }

    /// Three lines: header, type tag, message.
    pub fn text(self) -> &'static str {
        match self {
            DeviceStatus::Ok => "Success!\nS_OK\nEverything's good!",
            DeviceStatus::ConnectionDead => {
                "Connection error!\nE_CONNECTION_DEAD\nCheck if the tracker app is running, working and connected."
            }
            DeviceStatus::NoData => {
                "Connection error!\nE_NO_DATA\nCheck if the tracker app is running, working and connected."
            }
            DeviceStatus::InitFailed => {
                "Listener startup fail!\nE_INIT_FAILED\nThe data server failed to start, check logs and port number."
            }
            DeviceStatus::NotStarted => {
                "Connection error!\nE_NOT_STARTED\nInitialize the device to start the server's listener up."
            }
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceStatus::NotStarted => "NotStarted",
            DeviceStatus::ConnectionDead => "ConnectionDead",
            DeviceStatus::NoData => "NoData",
            DeviceStatus::InitFailed => "InitFailed",
            DeviceStatus::Ok => "Ok",
        };
        f.write_str(name)
    }
}

/// Host-facing text for a raw status code, including codes this device never reports.
pub fn status_text(code: u32) -> String {
    match DeviceStatus::from_code(code) {
        Some(status) => status.text().to_string(),
        None => format!(
            "Undefined: {code:#x}\nE_UNDEFINED\nSomething weird has happened, though we can't tell what."
        ),
    }
}
