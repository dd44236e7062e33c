//! Bus registration records.
//!
//! Every participant that joins the bus writes a registration record into
//! the bus directory. The proxy's launcher polls these records to resolve
//! the handle of a freshly launched child, and the forwarder reads them to
//! build send destinations.

use std::path::PathBuf;

/// Opaque serial a participant is known by on the bus.
///
/// Minted once when the participant joins; never reused for the lifetime of
/// the bus directory. The serial, not the pid, names the datagram socket,
/// so a recycled pid can never alias a stale socket.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ProcessSerial(pub u64);

impl std::fmt::Display for ProcessSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Registration record a participant writes when it joins the bus.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Registration {
    pub serial: ProcessSerial,
    pub pid: u32,
    pub socket: PathBuf,
}

impl Registration {
    /// The send destination this registration describes.
    pub fn address(&self) -> BusAddress {
        BusAddress {
            serial: self.serial,
            socket: self.socket.clone(),
        }
    }
}

/// A fully resolved send destination: serial plus the socket it listens on.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BusAddress {
    pub serial: ProcessSerial,
    pub socket: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_formats_as_fixed_width_hex() {
        assert_eq!(ProcessSerial(0xab).to_string(), "00000000000000ab");
    }

    // The record format is read by foreign processes (launched children
    // register themselves), so the field names are a compatibility surface.
    #[test]
    fn registration_field_names_are_stable() {
        let reg: Registration = serde_json::from_str(
            r#"{"serial":12,"pid":4321,"socket":"/run/evtproxy/000000000000000c.sock"}"#,
        )
        .expect("canonical record should parse");

        assert_eq!(reg.serial, ProcessSerial(12));
        assert_eq!(reg.pid, 4321);
        assert_eq!(reg.address().serial, ProcessSerial(12));
    }
}
