//! The connection pipeline: a plan of steps built from a profile, and the
//! runner that executes it with a checkpoint before every step.

use super::attempt::{ConnectAttempt, Link};
use crate::backends::utils::execute_script;
use crate::config::Thresholds;
use crate::profile::{DnsMode, DnsSettings, NetworkProfile};
use crate::types::{ConnectResult, ConnectStatus, Medium};
use tokio::time::Instant;

/// One unit of work in a connection plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    PreConnectScript(String),
    InterfaceDown,
    ResetIpAddress,
    RemoveOldConnection,
    FlushRoutingTable,
    ConfigureInterface,
    InterfaceUp,
    GeneratePsk,
    GenerateWpaConfig,
    Associate,
    ValidateAuthentication,
    SetBroadcastAddress,
    SetStaticIp,
    RunDhcp,
    SetStaticDns,
    VerifyAssociation,
    PostConnectScript(String),
    Done,
}

impl Step {
    /// The status reported while this step runs. Scripts keep whatever
    /// status was current.
    pub fn status(&self) -> Option<ConnectStatus> {
        let status = match self {
            Step::PreConnectScript(_) | Step::PostConnectScript(_) => return None,
            Step::InterfaceDown => ConnectStatus::InterfaceDown,
            Step::ResetIpAddress => ConnectStatus::ResettingIpAddress,
            Step::RemoveOldConnection => ConnectStatus::RemovingOldConnection,
            Step::FlushRoutingTable => ConnectStatus::FlushingRoutingTable,
            Step::ConfigureInterface => ConnectStatus::ConfiguringInterface,
            Step::InterfaceUp => ConnectStatus::InterfaceUp,
            Step::GeneratePsk => ConnectStatus::GeneratingPsk,
            Step::GenerateWpaConfig => ConnectStatus::GeneratingWpaConfig,
            Step::Associate => ConnectStatus::Associate,
            Step::ValidateAuthentication => ConnectStatus::ValidatingAuthentication,
            Step::SetBroadcastAddress => ConnectStatus::SettingBroadcastAddress,
            Step::SetStaticIp => ConnectStatus::SettingStaticIp,
            Step::RunDhcp => ConnectStatus::RunningDhcp,
            Step::SetStaticDns => ConnectStatus::SettingStaticDns,
            Step::VerifyAssociation => ConnectStatus::VerifyingAssociation,
            Step::Done => ConnectStatus::Done,
        };
        Some(status)
    }
}

/// Everything a running attempt needs besides the attempt handle itself.
#[derive(Debug, Clone)]
pub struct ConnectContext {
    pub link: Link,
    pub profile: NetworkProfile,
    /// Resolvers used when the profile selects global DNS.
    pub global_dns: DnsSettings,
    pub pre_script: Option<String>,
    pub post_script: Option<String>,
    pub hostname: Option<String>,
    pub verify_ap: bool,
    pub thresholds: Thresholds,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Builds the ordered plan for `ctx`'s medium and profile.
pub fn build_plan(ctx: &ConnectContext) -> Vec<Step> {
    let profile = &ctx.profile;
    let wireless = ctx.link.medium() == Medium::Wireless;
    let mut plan = Vec::new();

    if let Some(script) = non_empty(&ctx.pre_script) {
        plan.push(Step::PreConnectScript(script.to_string()));
    }
    plan.extend([
        Step::InterfaceDown,
        Step::ResetIpAddress,
        Step::RemoveOldConnection,
        Step::FlushRoutingTable,
        Step::ConfigureInterface,
        Step::InterfaceUp,
    ]);
    if wireless && non_empty(&profile.key).is_some() {
        plan.push(Step::GeneratePsk);
    }
    if profile.is_encrypted() {
        plan.push(Step::GenerateWpaConfig);
    }
    if wireless {
        plan.push(Step::Associate);
        if profile.is_encrypted() {
            plan.push(Step::ValidateAuthentication);
        }
    }
    if non_empty(&profile.broadcast).is_some() {
        plan.push(Step::SetBroadcastAddress);
    }
    plan.push(if profile.is_static() {
        Step::SetStaticIp
    } else {
        Step::RunDhcp
    });
    if profile.dns_mode != DnsMode::None {
        plan.push(Step::SetStaticDns);
    }
    if ctx.verify_ap && profile.is_static() && non_empty(&profile.gateway).is_some() {
        plan.push(Step::VerifyAssociation);
    }
    if let Some(script) = non_empty(&ctx.post_script) {
        plan.push(Step::PostConnectScript(script.to_string()));
    }
    plan.push(Step::Done);
    plan
}

/// Runs `plan` to completion or until the attempt is stopped, and returns
/// the attempt's final result.
pub async fn run(attempt: &ConnectAttempt, mut ctx: ConnectContext, plan: &[Step]) -> ConnectResult {
    match drive(attempt, &mut ctx, plan).await {
        Ok(()) => {
            attempt.finish(ConnectResult::Success);
            attempt.result().unwrap_or(ConnectResult::Success)
        }
        Err(result) => {
            tracing::info!(medium = %attempt.medium(), network = attempt.target(), %result, "Connection attempt stopped");
            result
        }
    }
}

async fn drive(
    attempt: &ConnectAttempt,
    ctx: &mut ConnectContext,
    plan: &[Step],
) -> Result<(), ConnectResult> {
    for step in plan {
        attempt.checkpoint()?;
        if let Some(status) = step.status() {
            attempt.set_status(status);
            tracing::debug!(medium = %attempt.medium(), %status, "Connect step");
        }
        if let Err(reason) = execute(step, attempt, ctx).await {
            tracing::warn!(medium = %attempt.medium(), step = ?step, %reason, "Connect step failed");
            attempt.fail(reason);
        }
    }
    attempt.checkpoint()
}

async fn execute(
    step: &Step,
    attempt: &ConnectAttempt,
    ctx: &mut ConnectContext,
) -> Result<(), ConnectResult> {
    let iface = ctx.link.iface();
    let name = iface.name().to_string();

    match step {
        Step::PreConnectScript(script) | Step::PostConnectScript(script) => {
            execute_script(script, &name).await;
        }
        Step::InterfaceDown => {
            if let Err(e) = iface.down().await {
                tracing::warn!(iface = %name, error = %e, "Could not bring interface down");
            }
        }
        Step::ResetIpAddress => {
            if let Err(e) = iface.release_dhcp().await {
                tracing::debug!(iface = %name, error = %e, "No DHCP lease to release");
            }
            if let Err(e) = iface.set_address(Some("0.0.0.0"), None, None).await {
                tracing::warn!(iface = %name, error = %e, "Could not reset address");
            }
        }
        Step::RemoveOldConnection => {
            if let Err(e) = iface.stop_wpa().await {
                tracing::debug!(iface = %name, error = %e, "Could not stop wpa_supplicant");
            }
            if let Err(e) = iface.stop_dhcp().await {
                tracing::debug!(iface = %name, error = %e, "Could not stop DHCP clients");
            }
        }
        Step::FlushRoutingTable => {
            if let Err(e) = iface.flush_routes().await {
                tracing::warn!(iface = %name, error = %e, "Could not flush routes");
            }
        }
        // Status marker only; the interface is configured by the steps
        // that follow.
        Step::ConfigureInterface => {}
        Step::InterfaceUp => interface_up(attempt, ctx).await,
        Step::GeneratePsk => generate_psk(ctx).await,
        Step::GenerateWpaConfig => {
            if let Err(e) = iface.authenticate(&ctx.profile).await {
                tracing::error!(iface = %name, error = %e, "Could not start authentication");
                return Err(ConnectResult::AssociationFailed);
            }
        }
        Step::Associate => associate(ctx).await?,
        Step::ValidateAuthentication => validate_authentication(attempt, ctx).await?,
        Step::SetBroadcastAddress => {
            let broadcast = ctx.profile.broadcast.as_deref();
            if let Err(e) = iface.set_address(None, None, broadcast).await {
                tracing::warn!(iface = %name, error = %e, "Could not set broadcast address");
            }
        }
        Step::SetStaticIp => set_static_ip(ctx).await?,
        Step::RunDhcp => {
            let outcome = iface
                .start_dhcp(ctx.hostname.as_deref())
                .await
                .map_err(|e| {
                    tracing::error!(iface = %name, error = %e, "DHCP client could not run");
                    ConnectResult::DhcpFailed
                })?;
            if let Some(failure) = outcome.failure() {
                return Err(failure);
            }
        }
        Step::SetStaticDns => {
            let dns = match ctx.profile.dns_mode {
                DnsMode::Global => ctx.global_dns.clone(),
                DnsMode::Static => ctx.profile.static_dns(),
                DnsMode::None => DnsSettings::default(),
            };
            if dns.is_empty() {
                tracing::debug!(iface = %name, "No DNS servers configured, leaving resolver alone");
            } else if let Err(e) = iface.set_dns(&dns).await {
                tracing::warn!(iface = %name, error = %e, "Could not write resolver config");
            }
        }
        Step::VerifyAssociation => verify_association(attempt, ctx).await?,
        Step::Done => {
            tracing::info!(iface = %name, network = attempt.target(), "Connection established");
        }
    }
    Ok(())
}

/// Polls until the link reports up. A link that never comes up is logged
/// and the pipeline carries on; DHCP or validation will fail later if it
/// really is dead.
async fn interface_up(attempt: &ConnectAttempt, ctx: &ConnectContext) {
    let iface = ctx.link.iface();
    if let Err(e) = iface.up().await {
        tracing::warn!(iface = iface.name(), error = %e, "Could not bring interface up");
    }
    let limits = &ctx.thresholds;
    for _ in 0..limits.interface_up_attempts {
        if iface.is_up().await || attempt.cancel_requested() {
            return;
        }
        tokio::time::sleep(limits.interface_up_interval).await;
    }
    tracing::warn!(iface = iface.name(), "Interface did not come up, continuing anyway");
}

async fn generate_psk(ctx: &mut ConnectContext) {
    let Link::Wireless(wireless) = &ctx.link else {
        return;
    };
    let (Some(essid), Some(key)) = (ctx.profile.essid.clone(), ctx.profile.key.clone()) else {
        return;
    };
    let psk = wireless.generate_psk(&essid, &key).await;
    if psk.is_none() {
        tracing::warn!(iface = wireless.name(), "PSK generation failed, falling back to the raw key");
    }
    ctx.profile.psk = psk.or(Some(key));
}

async fn associate(ctx: &ConnectContext) -> Result<(), ConnectResult> {
    let Link::Wireless(wireless) = &ctx.link else {
        return Ok(());
    };
    let profile = &ctx.profile;
    let mode = profile.mode.as_deref().unwrap_or("managed");
    if let Err(e) = wireless.set_mode(mode).await {
        tracing::warn!(iface = wireless.name(), error = %e, "Could not set mode");
    }
    let essid = profile.essid.as_deref().unwrap_or_default();
    wireless
        .associate(essid, profile.channel, profile.bssid.as_deref())
        .await
        .map_err(|e| {
            tracing::error!(iface = wireless.name(), essid, error = %e, "Association failed");
            ConnectResult::AssociationFailed
        })
}

/// Waits for the supplicant to report `COMPLETED`.
///
/// Repeated `DISCONNECTED` readings force a rescan and push the deadline
/// back, up to one extra `auth_timeout` in total.
async fn validate_authentication(
    attempt: &ConnectAttempt,
    ctx: &ConnectContext,
) -> Result<(), ConnectResult> {
    let iface = ctx.link.iface();
    let limits = &ctx.thresholds;
    let start = Instant::now();
    let hard_limit = start + limits.auth_timeout * 2;
    let mut deadline = start + limits.auth_timeout;
    let mut disconnected = 0;

    while Instant::now() < deadline {
        if attempt.cancel_requested() {
            return Ok(());
        }
        let Some(state) = iface.wpa_state().await else {
            tracing::error!(iface = iface.name(), "No wpa_supplicant state available");
            return Err(ConnectResult::BadPass);
        };
        match state.as_str() {
            "COMPLETED" => {
                tracing::debug!(iface = iface.name(), elapsed = ?start.elapsed(), "Authentication completed");
                return Ok(());
            }
            "DISCONNECTED" => {
                disconnected += 1;
                if disconnected >= limits.auth_disconnected_limit {
                    tracing::debug!(iface = iface.name(), "Supplicant stuck disconnected, forcing a rescan");
                    if let Err(e) = iface.force_supplicant_scan().await {
                        tracing::warn!(iface = iface.name(), error = %e, "Could not force a supplicant scan");
                    }
                    deadline = (deadline + limits.auth_extension).min(hard_limit);
                    disconnected = 0;
                }
            }
            _ => disconnected = 0,
        }
        tokio::time::sleep(limits.auth_poll_interval).await;
    }
    tracing::warn!(iface = iface.name(), "Authentication timed out, wrong key?");
    Err(ConnectResult::BadPass)
}

async fn set_static_ip(ctx: &ConnectContext) -> Result<(), ConnectResult> {
    let iface = ctx.link.iface();
    let profile = &ctx.profile;
    if let Err(e) = iface
        .set_address(profile.ip.as_deref(), profile.netmask.as_deref(), None)
        .await
    {
        tracing::error!(iface = iface.name(), error = %e, "Could not set static address");
        return Err(ConnectResult::DhcpFailed);
    }
    if let Some(gateway) = non_empty(&profile.gateway) {
        if let Err(e) = iface.set_default_route(gateway).await {
            tracing::warn!(iface = iface.name(), gateway, error = %e, "Could not set default route");
        }
    }
    Ok(())
}

/// Pings the static gateway; on total failure undoes the address setup.
async fn verify_association(
    attempt: &ConnectAttempt,
    ctx: &ConnectContext,
) -> Result<(), ConnectResult> {
    let iface = ctx.link.iface();
    let Some(gateway) = non_empty(&ctx.profile.gateway) else {
        return Ok(());
    };
    let limits = &ctx.thresholds;
    for attempt_no in 0..limits.verify_ap_attempts {
        if attempt.cancel_requested() {
            return Ok(());
        }
        if iface.check_gateway(gateway).await {
            return Ok(());
        }
        if attempt_no + 1 < limits.verify_ap_attempts {
            tokio::time::sleep(limits.verify_ap_interval).await;
        }
    }

    tracing::warn!(iface = iface.name(), gateway, "Gateway unreachable, dropping association");
    if let Err(e) = iface.set_address(Some("0.0.0.0"), None, None).await {
        tracing::warn!(iface = iface.name(), error = %e, "Could not reset address");
    }
    if let Err(e) = iface.flush_routes().await {
        tracing::warn!(iface = iface.name(), error = %e, "Could not flush routes");
    }
    if let Err(e) = iface.stop_wpa().await {
        tracing::warn!(iface = iface.name(), error = %e, "Could not stop wpa_supplicant");
    }
    Err(ConnectResult::AssociationFailed)
}
