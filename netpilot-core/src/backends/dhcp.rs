//! DHCP client selection and output classification.

use super::utils::find_program;
use crate::config::DhcpClientChoice;
use crate::types::DhcpOutcome;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Binaries killed when stopping DHCP, whichever client started them.
pub const KNOWN_DHCP_BINARIES: &[&str] = &["dhclient", "dhclient3", "pump", "dhcpcd-bin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpClient {
    Dhclient,
    Dhcpcd,
    Pump,
}

/// Auto-detection order.
const DETECT_ORDER: [DhcpClient; 3] = [DhcpClient::Dhclient, DhcpClient::Dhcpcd, DhcpClient::Pump];

impl DhcpClient {
    pub fn binary(&self) -> &'static str {
        match self {
            DhcpClient::Dhclient => "dhclient",
            DhcpClient::Dhcpcd => "dhcpcd",
            DhcpClient::Pump => "pump",
        }
    }

    /// Finds the configured client, falling back to the first installed one.
    pub fn resolve(choice: DhcpClientChoice) -> Option<(DhcpClient, PathBuf)> {
        let preferred = match choice {
            DhcpClientChoice::Auto => None,
            DhcpClientChoice::Dhclient => Some(DhcpClient::Dhclient),
            DhcpClientChoice::Dhcpcd => Some(DhcpClient::Dhcpcd),
            DhcpClientChoice::Pump => Some(DhcpClient::Pump),
        };
        if let Some(client) = preferred {
            match find_program(client.binary()) {
                Some(path) => return Some((client, path)),
                None => tracing::warn!(
                    client = client.binary(),
                    "Configured DHCP client not found, trying the others"
                ),
            }
        }
        let found = DETECT_ORDER
            .iter()
            .find_map(|c| find_program(c.binary()).map(|p| (*c, p)));
        if found.is_none() {
            tracing::warn!("No supported DHCP client could be found");
        }
        found
    }

    pub fn start_args(&self, iface: &str, hostname: Option<&str>) -> Vec<String> {
        let hostname = hostname.filter(|h| !h.is_empty());
        let mut args = Vec::new();
        match self {
            // dhclient takes its hostname from dhclient.conf.
            DhcpClient::Dhclient => {}
            DhcpClient::Dhcpcd => {
                if let Some(h) = hostname {
                    args.extend(["-H".to_string(), h.to_string()]);
                }
            }
            DhcpClient::Pump => {
                if let Some(h) = hostname {
                    args.extend(["-h".to_string(), h.to_string()]);
                }
                args.push("-i".to_string());
            }
        }
        args.push(iface.to_string());
        args
    }

    pub fn release_args(&self, iface: &str) -> Vec<String> {
        let flags: &[&str] = match self {
            DhcpClient::Dhclient => &["-r"],
            DhcpClient::Dhcpcd => &["-k"],
            DhcpClient::Pump => &["-r", "-i"],
        };
        flags
            .iter()
            .map(|f| f.to_string())
            .chain(std::iter::once(iface.to_string()))
            .collect()
    }

    /// Returns the outcome once a line settles it.
    pub fn classify_line(&self, line: &str) -> Option<DhcpOutcome> {
        match self {
            DhcpClient::Dhclient if line.starts_with("bound") => Some(DhcpOutcome::Success),
            DhcpClient::Dhclient if line.contains("No DHCPOFFERS") => Some(DhcpOutcome::NoDhcpOffers),
            DhcpClient::Dhcpcd if line.starts_with("Error") => Some(DhcpOutcome::DhcpFailed),
            DhcpClient::Pump if line.trim().to_ascii_lowercase().starts_with("operation failed.") => {
                Some(DhcpOutcome::DhcpFailed)
            }
            _ => None,
        }
    }

    /// Outcome when the client exits without printing a deciding line.
    pub fn outcome_at_eof(&self) -> DhcpOutcome {
        match self {
            DhcpClient::Dhclient => DhcpOutcome::DhcpFailed,
            DhcpClient::Dhcpcd | DhcpClient::Pump => DhcpOutcome::Success,
        }
    }
}

/// Reads the client's stdout and stderr line by line until the outcome is
/// known or both streams close.
pub async fn read_outcome<O, E>(client: DhcpClient, stdout: O, stderr: E) -> DhcpOutcome
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out = BufReader::new(stdout).lines();
    let mut err = BufReader::new(stderr).lines();
    let (mut out_done, mut err_done) = (false, false);

    while !(out_done && err_done) {
        let line = tokio::select! {
            line = out.next_line(), if !out_done => match line {
                Ok(Some(line)) => line,
                _ => {
                    out_done = true;
                    continue;
                }
            },
            line = err.next_line(), if !err_done => match line {
                Ok(Some(line)) => line,
                _ => {
                    err_done = true;
                    continue;
                }
            },
        };
        tracing::debug!(client = client.binary(), %line);
        if let Some(outcome) = client.classify_line(&line) {
            return outcome;
        }
    }
    client.outcome_at_eof()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_release_args() {
        assert_eq!(DhcpClient::Dhclient.start_args("eth0", Some("box")), vec!["eth0"]);
        assert_eq!(
            DhcpClient::Dhcpcd.start_args("eth0", Some("box")),
            vec!["-H", "box", "eth0"]
        );
        assert_eq!(DhcpClient::Pump.start_args("eth0", None), vec!["-i", "eth0"]);
        assert_eq!(DhcpClient::Dhclient.release_args("eth0"), vec!["-r", "eth0"]);
        assert_eq!(DhcpClient::Dhcpcd.release_args("eth0"), vec!["-k", "eth0"]);
        assert_eq!(DhcpClient::Pump.release_args("eth0"), vec!["-r", "-i", "eth0"]);
    }

    #[tokio::test]
    async fn test_dhclient_markers() {
        let bound = b"DHCPREQUEST on wlan0\nbound to 10.0.0.5 -- renewal in 300 seconds.\n";
        assert_eq!(
            read_outcome(DhcpClient::Dhclient, &bound[..], &b""[..]).await,
            DhcpOutcome::Success
        );

        let no_offers = b"DHCPDISCOVER on wlan0\nNo DHCPOFFERS received.\n";
        assert_eq!(
            read_outcome(DhcpClient::Dhclient, &b""[..], &no_offers[..]).await,
            DhcpOutcome::NoDhcpOffers
        );

        let silent = b"DHCPDISCOVER on wlan0\n";
        assert_eq!(
            read_outcome(DhcpClient::Dhclient, &silent[..], &b""[..]).await,
            DhcpOutcome::DhcpFailed
        );
    }

    #[tokio::test]
    async fn test_dhcpcd_and_pump_markers() {
        let failed = b"Error, timed out waiting for a valid DHCP server response\n";
        assert_eq!(
            read_outcome(DhcpClient::Dhcpcd, &failed[..], &b""[..]).await,
            DhcpOutcome::DhcpFailed
        );
        assert_eq!(
            read_outcome(DhcpClient::Dhcpcd, &b"eth0: leased 10.0.0.9\n"[..], &b""[..]).await,
            DhcpOutcome::Success
        );
        assert_eq!(
            read_outcome(DhcpClient::Pump, &b""[..], &b"Operation failed.\n"[..]).await,
            DhcpOutcome::DhcpFailed
        );
    }
}
