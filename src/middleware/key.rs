use actix_web::dev::ServiceRequest;
use actix_web::{HttpResponse, ResponseError};
use std::net::{AddrParseError, IpAddr, Ipv6Addr};
use thiserror::Error;

/// How to derive the rate limiting key from a request's network origin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyStrategy {
    /// The client's real IP.
    ///
    /// # Security
    ///
    /// This uses
    /// [ConnectionInfo::realip_remote_addr()](actix_web::dev::ConnectionInfo::realip_remote_addr)
    /// internally which is only suitable for applications deployed behind a proxy that you
    /// control.
    RealIp,
    /// The connection peer IP, suitable when clients connect directly to the application.
    PeerIp,
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Unable to parse remote IP address: {0}")]
    InvalidIp(
        #[source]
        #[from]
        AddrParseError,
    ),
    #[error("Request has no remote address")]
    MissingAddress,
}

impl ResponseError for KeyError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::InternalServerError().finish()
    }
}

pub(crate) fn client_key(req: &ServiceRequest, strategy: KeyStrategy) -> Result<String, KeyError> {
    let info = req.connection_info();
    let addr = match strategy {
        KeyStrategy::RealIp => info.realip_remote_addr(),
        KeyStrategy::PeerIp => info.peer_addr(),
    };
    ip_key(addr.ok_or(KeyError::MissingAddress)?)
}

// Groups IPv6 addresses together, see:
// https://adam-p.ca/blog/2022/02/ipv6-rate-limiting/
// https://support.cloudflare.com/hc/en-us/articles/115001635128-Configuring-Cloudflare-Rate-Limiting
fn ip_key(ip_str: &str) -> Result<String, KeyError> {
    let ip = ip_str.parse::<IpAddr>()?;
    Ok(match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4() {
                return Ok(v4.to_string());
            }
            let zeroes = [0u16; 4];
            let concat = [&v6.segments()[0..4], &zeroes].concat();
            let concat: [u16; 8] = concat.try_into().unwrap();
            let subnet = Ipv6Addr::from(concat);
            format!("{}/64", subnet)
        }
    })
}
