//! Status lines for the terminal

use serial_snoop_bridge::EndpointConfig;

/// `Running: UP ⇄ DOWN [+ Mirror(M)] @ Nbps`
pub fn running_status(
    upstream: &EndpointConfig,
    downstream: &EndpointConfig,
    mirror: Option<&EndpointConfig>,
) -> String {
    let mirror = mirror
        .map(|m| format!(" + Mirror({})", m.port_name))
        .unwrap_or_default();
    format!(
        "Running: {} ⇄ {}{} @ {}bps",
        upstream.port_name, downstream.port_name, mirror, upstream.baud_rate
    )
}

/// Final status line for a session
pub fn stopped_status(fault: Option<&str>) -> String {
    match fault {
        None => "Bridge stopped".to_string(),
        Some(message) => format!("Bridge error: {}", message),
    }
}

/// Summary line for a port listing
pub fn ports_status(count: usize) -> String {
    if count == 0 {
        "No serial ports found".to_string()
    } else {
        format!("Found {} ports", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_status() {
        let up = EndpointConfig::new("COM3").with_baud_rate(115_200);
        let down = up.for_port("COM4");
        assert_eq!(
            running_status(&up, &down, None),
            "Running: COM3 ⇄ COM4 @ 115200bps"
        );

        let mirror = up.for_port("COM5");
        assert_eq!(
            running_status(&up, &down, Some(&mirror)),
            "Running: COM3 ⇄ COM4 + Mirror(COM5) @ 115200bps"
        );
    }

    #[test]
    fn test_stopped_status() {
        assert_eq!(stopped_status(None), "Bridge stopped");
        assert_eq!(
            stopped_status(Some("Write to COM4 timed out after 2000ms")),
            "Bridge error: Write to COM4 timed out after 2000ms"
        );
    }

    #[test]
    fn test_ports_status() {
        assert_eq!(ports_status(0), "No serial ports found");
        assert_eq!(ports_status(3), "Found 3 ports");
    }
}
