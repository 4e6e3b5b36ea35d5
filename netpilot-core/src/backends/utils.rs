use crate::profile::DnsSettings;
use crate::{Error, Result};
use std::ffi::OsStr;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::str::FromStr;
use tokio::process::Command;

/// Directories searched after `PATH`; root-only tools often live in sbin
/// directories that unprivileged `PATH`s omit.
const EXTRA_SEARCH_DIRS: &[&str] = &[
    "/sbin",
    "/usr/sbin",
    "/bin",
    "/usr/bin",
    "/usr/local/sbin",
    "/usr/local/bin",
];

/// Locates an executable on `PATH` or in the usual sbin directories.
pub fn find_program(name: &str) -> Option<PathBuf> {
    let path_dirs = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect::<Vec<_>>())
        .unwrap_or_default();
    path_dirs
        .into_iter()
        .chain(EXTRA_SEARCH_DIRS.iter().map(PathBuf::from))
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

pub async fn run_output<I, S>(program: &str, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().collect();
    tracing::trace!(
        program,
        args = ?args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()).collect::<Vec<_>>(),
        "Running command"
    );
    Ok(Command::new(program).args(&args).output().await?)
}

/// Runs a command and returns stdout followed by stderr, whatever the exit
/// status. Used for tools whose useful output is text even on failure.
pub async fn run_text<I, S>(program: &str, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_output(program, args).await?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

/// Runs a command and fails with `Error::CommandFailed` on a non-zero exit.
pub async fn run_checked<I, S>(program: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_output(program, args).await?;
    if !output.status.success() {
        let error_msg = String::from_utf8_lossy(&output.stderr);
        return Err(Error::CommandFailed(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            error_msg.trim()
        )));
    }
    Ok(())
}

/// Runs a user-configured hook script through `sh -c`.
///
/// Hook failures are logged and otherwise ignored: a broken script must not
/// stop a connection from being made or torn down.
pub async fn execute_script(script: &str, iface: &str) {
    if script.trim().is_empty() {
        return;
    }
    tracing::info!(iface, script, "Executing script");
    match Command::new("sh")
        .arg("-c")
        .arg(script)
        .env("NETPILOT_INTERFACE", iface)
        .status()
        .await
    {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::warn!(iface, script, %status, "Script exited unsuccessfully"),
        Err(e) => tracing::warn!(iface, script, error = %e, "Failed to run script"),
    }
}

pub fn is_valid_ipv4(s: &str) -> bool {
    Ipv4Addr::from_str(s.trim()).is_ok()
}

/// Validates an optional dotted-quad field. Empty values count as absent.
pub fn validated_ipv4<'a>(field: &str, value: Option<&'a str>) -> Result<Option<&'a str>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) if is_valid_ipv4(v) => Ok(Some(v)),
        Some(v) => Err(Error::InvalidAddress(format!("{field} '{v}'"))),
    }
}

/// Renders resolver settings in `resolv.conf` syntax, skipping invalid
/// nameservers.
pub fn render_resolv_conf(dns: &DnsSettings) -> String {
    let mut out = String::new();
    if let Some(domain) = dns.domain.as_deref().filter(|d| !d.is_empty()) {
        out.push_str(&format!("domain {domain}\n"));
    }
    if let Some(search) = dns.search_domain.as_deref().filter(|d| !d.is_empty()) {
        out.push_str(&format!("search {search}\n"));
    }
    for server in &dns.servers {
        if is_valid_ipv4(server) {
            out.push_str(&format!("nameserver {}\n", server.trim()));
        } else {
            tracing::warn!(server = %server, "Skipping invalid DNS server");
        }
    }
    out
}

pub async fn write_resolv_conf(path: &Path, dns: &DnsSettings) -> Result<()> {
    tokio::fs::write(path, render_resolv_conf(dns)).await?;
    Ok(())
}

fn net_entries(sys_class_net: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match std::fs::read_dir(sys_class_net) {
        Ok(dir) => dir.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(e) => {
            tracing::debug!(path = %sys_class_net.display(), error = %e, "Cannot list network interfaces");
            Vec::new()
        }
    };
    entries.sort();
    entries
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// First interface under `sys_class_net` with a `wireless` directory.
pub fn detect_wireless_interface(sys_class_net: &Path) -> Option<String> {
    net_entries(sys_class_net)
        .into_iter()
        .find(|p| p.join("wireless").is_dir())
        .and_then(|p| file_name(&p))
}

/// First ethernet-type (`type == 1`) interface that is neither loopback nor
/// wireless.
pub fn detect_wired_interface(sys_class_net: &Path) -> Option<String> {
    net_entries(sys_class_net)
        .into_iter()
        .filter(|p| file_name(p).is_some_and(|n| n != "lo"))
        .filter(|p| !p.join("wireless").is_dir())
        .find(|p| {
            std::fs::read_to_string(p.join("type")).is_ok_and(|t| t.trim() == "1")
        })
        .and_then(|p| file_name(&p))
}
