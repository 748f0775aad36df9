//! Serial port enumeration

use serde::Serialize;
use std::fmt;

#[cfg(feature = "serial")]
use crate::error::Result;
#[cfg(feature = "serial")]
use tracing::debug;

/// An enumerated serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Name to pass to [`crate::EndpointConfig::new`]
    pub name: String,
    /// Bus type ("usb", "pci", "bluetooth" or "unknown")
    pub kind: &'static str,
    /// USB vendor ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    /// USB product ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
    /// USB manufacturer string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// USB product string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// USB serial number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// A port with no bus metadata
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "unknown",
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " [{:04X}:{:04X}]", vid, pid)?;
        }
        if let Some(product) = &self.product {
            write!(f, " {}", product)?;
        }
        Ok(())
    }
}

/// Sort ports by name, ignoring ASCII case
pub(crate) fn sort_ports(ports: &mut [PortInfo]) {
    ports.sort_by_key(|p| p.name.to_ascii_lowercase());
}

/// List the serial ports present on this machine, sorted by name
#[cfg(feature = "serial")]
pub fn list_ports() -> Result<Vec<PortInfo>> {
    use serialport::SerialPortType;

    let mut ports: Vec<PortInfo> = serialport::available_ports()?
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb) => PortInfo {
                name: port.port_name,
                kind: "usb",
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            SerialPortType::PciPort => PortInfo {
                kind: "pci",
                ..PortInfo::named(port.port_name)
            },
            SerialPortType::BluetoothPort => PortInfo {
                kind: "bluetooth",
                ..PortInfo::named(port.port_name)
            },
            SerialPortType::Unknown => PortInfo::named(port.port_name),
        })
        .collect();

    sort_ports(&mut ports);
    debug!(count = ports.len(), "Enumerated serial ports");
    Ok(ports)
}
