//! Service discovery and operator address hints.
//!
//! Registers the relay on link-local multicast DNS so web clients on the
//! LAN can find it by name. Discovery is best-effort: on any failure the
//! server logs a warning and keeps running. Independently of mDNS, every
//! non-loopback site-local IPv4 address is logged with the web port so
//! operators can announce a fallback URL over the radio.

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

const SERVICE_TYPE: &str = "_http._tcp.local.";
const INSTANCE_NAME: &str = "helphub";

/// Handle to an announced service; unregisters on [`Discovery::shutdown`].
pub struct Discovery {
    daemon: Option<ServiceDaemon>,
    fullname: Option<String>,
}

/// Announce the web endpoint over mDNS. Never fails the caller.
pub fn announce(http_port: u16) -> Discovery {
    let daemon = match ServiceDaemon::new() {
        Ok(daemon) => daemon,
        Err(e) => {
            warn!(error = %e, "mDNS unavailable, continuing without discovery");
            return Discovery { daemon: None, fullname: None };
        }
    };

    let service = ServiceInfo::new(
        SERVICE_TYPE,
        INSTANCE_NAME,
        &format!("{INSTANCE_NAME}.local."),
        "",
        http_port,
        [("app", "helphub")].as_slice(),
    )
    .map(|info| info.enable_addr_auto());

    match service {
        Ok(service) => {
            let fullname = service.get_fullname().to_string();
            match daemon.register(service) {
                Ok(()) => {
                    info!(service = %fullname, "registered on mDNS");
                    Discovery { daemon: Some(daemon), fullname: Some(fullname) }
                }
                Err(e) => {
                    warn!(error = %e, "mDNS registration failed, continuing without discovery");
                    Discovery { daemon: None, fullname: None }
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "could not describe mDNS service, continuing without discovery");
            Discovery { daemon: None, fullname: None }
        }
    }
}

/// Log every non-loopback site-local IPv4 address with the web port.
pub fn log_site_local_addresses(http_port: u16) {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!(error = %e, "could not enumerate network interfaces");
            return;
        }
    };

    for interface in interfaces {
        if interface.is_loopback() {
            continue;
        }
        if let std::net::IpAddr::V4(addr) = interface.ip() {
            if addr.is_private() {
                info!(
                    interface = %interface.name,
                    url = %format!("http://{addr}:{http_port}"),
                    "web client reachable at"
                );
            }
        }
    }
}

impl Discovery {
    /// Withdraw the mDNS announcement on clean shutdown.
    pub fn shutdown(self) {
        let (Some(daemon), Some(fullname)) = (self.daemon, self.fullname) else {
            return;
        };
        if let Err(e) = daemon.unregister(&fullname) {
            warn!(error = %e, "mDNS unregister failed");
        }
        let _ = daemon.shutdown();
    }
}
