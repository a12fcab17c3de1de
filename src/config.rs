//! Client configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::types::Source;

type Result<T> = std::result::Result<T, Error>;

/// Port LIFX devices listen on.
pub const DEFAULT_PORT: u16 = 56700;
pub const DEFAULT_BROADCAST: Ipv4Addr = Ipv4Addr::BROADCAST;
pub const DEFAULT_LIGHT_OFFLINE_TOLERANCE: u64 = 3;
pub const DEFAULT_MESSAGE_HANDLER_TIMEOUT: Duration = Duration::from_millis(45_000);
pub const DEFAULT_RESEND_PACKET_DELAY: Duration = Duration::from_millis(150);
pub const DEFAULT_RESEND_MAX_TIMES: u32 = 3;
pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_millis(5_000);

/// Unvalidated client options, as a user or a JSON file supplies them.
///
/// Every field is optional. Call [`ClientOptions::validate`] (or pass the
/// options to [`Client::init`](crate::Client::init), which does) to get a
/// [`ClientConfig`].
///
/// # Examples
///
/// ```
/// use lifx_lan_client::ClientOptions;
///
/// let config = ClientOptions::new()
///     .address("127.0.0.1")
///     .lights(["192.168.0.100"])
///     .stop_after_discovery(true)
///     .validate()
///     .unwrap();
/// assert_eq!(config.lights.len(), 1);
///
/// assert!(ClientOptions::new().send_port(0).validate().is_err());
/// ```
#[serde_with::skip_serializing_none]
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientOptions {
    address: Option<String>,
    port: Option<i64>,
    source: Option<String>,
    broadcast: Option<String>,
    send_port: Option<i64>,
    light_offline_tolerance: Option<u64>,
    message_handler_timeout: Option<u64>,
    resend_packet_delay: Option<u64>,
    resend_max_times: Option<u32>,
    discovery_interval: Option<u64>,
    lights: Option<Vec<String>>,
    stop_after_discovery: Option<bool>,
    start_discovery: Option<bool>,
    debug: Option<bool>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON. Fields of the wrong JSON type are reported as
    /// [`Error::InvalidArgument`].
    ///
    /// ```
    /// use lifx_lan_client::{ClientOptions, Error};
    ///
    /// let options = ClientOptions::from_json(r#"{"port": 56701, "debug": true}"#).unwrap();
    /// assert!(options.validate().unwrap().debug);
    ///
    /// let err = ClientOptions::from_json(r#"{"port": "57500"}"#).unwrap_err();
    /// assert!(matches!(err, Error::InvalidArgument(_)));
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            if e.is_data() {
                Error::invalid(e.to_string())
            } else {
                Error::JsonLoad(e)
            }
        })
    }

    /// Local IPv4 address to bind.
    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    /// Local port to bind; 0 picks an ephemeral port.
    pub fn port(mut self, port: i64) -> Self {
        self.port = Some(port);
        self
    }

    /// Client source id as 8 hex characters.
    pub fn source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn broadcast(mut self, broadcast: &str) -> Self {
        self.broadcast = Some(broadcast.to_string());
        self
    }

    /// Port devices are addressed on.
    pub fn send_port(mut self, port: i64) -> Self {
        self.send_port = Some(port);
        self
    }

    /// Discovery cycles a device may miss before it is marked off.
    pub fn light_offline_tolerance(mut self, cycles: u64) -> Self {
        self.light_offline_tolerance = Some(cycles);
        self
    }

    pub fn message_handler_timeout(mut self, millis: u64) -> Self {
        self.message_handler_timeout = Some(millis);
        self
    }

    pub fn resend_packet_delay(mut self, millis: u64) -> Self {
        self.resend_packet_delay = Some(millis);
        self
    }

    pub fn resend_max_times(mut self, times: u32) -> Self {
        self.resend_max_times = Some(times);
        self
    }

    pub fn discovery_interval(mut self, millis: u64) -> Self {
        self.discovery_interval = Some(millis);
        self
    }

    /// Probe these addresses instead of broadcasting.
    pub fn lights<I, S>(mut self, lights: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lights = Some(lights.into_iter().map(Into::into).collect());
        self
    }

    /// Stop discovery once every configured light has answered.
    pub fn stop_after_discovery(mut self, stop: bool) -> Self {
        self.stop_after_discovery = Some(stop);
        self
    }

    pub fn start_discovery(mut self, start: bool) -> Self {
        self.start_discovery = Some(start);
        self
    }

    /// Log every packet sent and received.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Check every option and fill in defaults.
    pub fn validate(&self) -> Result<ClientConfig> {
        let lights = self
            .lights
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|light| parse_ipv4("lights", light))
            .collect::<Result<Vec<_>>>()?;

        Ok(ClientConfig {
            address: self
                .address
                .as_deref()
                .map(|a| parse_ipv4("address", a))
                .transpose()?
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
            port: self
                .port
                .map(|p| port_in_range("port", p, 0))
                .transpose()?
                .unwrap_or(0),
            source: self
                .source
                .as_deref()
                .map(str::parse::<Source>)
                .transpose()?
                .unwrap_or_else(Source::random),
            broadcast: self
                .broadcast
                .as_deref()
                .map(|b| parse_ipv4("broadcast", b))
                .transpose()?
                .unwrap_or(DEFAULT_BROADCAST),
            send_port: self
                .send_port
                .map(|p| port_in_range("sendPort", p, 1))
                .transpose()?
                .unwrap_or(DEFAULT_PORT),
            light_offline_tolerance: self
                .light_offline_tolerance
                .unwrap_or(DEFAULT_LIGHT_OFFLINE_TOLERANCE),
            message_handler_timeout: self
                .message_handler_timeout
                .map_or(DEFAULT_MESSAGE_HANDLER_TIMEOUT, Duration::from_millis),
            resend_packet_delay: self
                .resend_packet_delay
                .map_or(DEFAULT_RESEND_PACKET_DELAY, Duration::from_millis),
            resend_max_times: self.resend_max_times.unwrap_or(DEFAULT_RESEND_MAX_TIMES),
            discovery_interval: self
                .discovery_interval
                .map(|millis| positive_millis("discoveryInterval", millis))
                .transpose()?
                .unwrap_or(DEFAULT_DISCOVERY_INTERVAL),
            lights,
            stop_after_discovery: self.stop_after_discovery.unwrap_or(false),
            start_discovery: self.start_discovery.unwrap_or(true),
            debug: self.debug.unwrap_or(false),
        })
    }
}

/// Validated client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub address: Ipv4Addr,
    pub port: u16,
    pub source: Source,
    pub broadcast: Ipv4Addr,
    pub send_port: u16,
    pub light_offline_tolerance: u64,
    pub message_handler_timeout: Duration,
    pub resend_packet_delay: Duration,
    pub resend_max_times: u32,
    pub discovery_interval: Duration,
    pub lights: Vec<Ipv4Addr>,
    pub stop_after_discovery: bool,
    pub start_discovery: bool,
    pub debug: bool,
}

fn parse_ipv4(field: &str, value: &str) -> Result<Ipv4Addr> {
    match value.parse::<IpAddr>() {
        Ok(IpAddr::V4(address)) => Ok(address),
        Ok(IpAddr::V6(_)) => Err(Error::invalid(format!(
            "{field} must be an IPv4 address, got IPv6 {value:?}"
        ))),
        Err(_) => Err(Error::invalid(format!(
            "{field} must be an IPv4 address, got {value:?}"
        ))),
    }
}

fn port_in_range(field: &str, port: i64, min: u16) -> Result<u16> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p >= min)
        .ok_or_else(|| Error::range(format!("{field} must be in {min}-65535, got {port}")))
}

fn positive_millis(field: &str, millis: u64) -> Result<Duration> {
    if millis == 0 {
        return Err(Error::range(format!("{field} must be at least 1ms, got 0")));
    }
    Ok(Duration::from_millis(millis))
}
