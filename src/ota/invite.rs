// Invite exchange: tell the device where to fetch the firmware from.
//
// Two device contracts exist. Newer firmware takes a JSON POST on /ota and
// reports progress on /ota/status; older firmware takes a query-string GET
// on / and flashes before answering.

use std::net::IpAddr;
use std::time::Duration;

use clap::ValueEnum;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::device::DeviceAddress;
use crate::error::{OtaError, Result};
use crate::progress::Reporter;

/// What the device needs to pull and verify the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRequest {
    pub md5: String,
    pub host: IpAddr,
    pub port: u16,
    /// Absolute path on the file server, e.g. `/firmware.bin`
    pub path: String,
    pub version: Option<String>,
}

impl InviteRequest {
    pub fn new(md5: impl Into<String>, host: IpAddr, port: u16, file_name: &str) -> Self {
        Self {
            md5: md5.into(),
            host,
            port,
            path: format!("/{}", file_name.trim_start_matches('/')),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// URL the device downloads the firmware from
    pub fn url(&self) -> String {
        match self.host {
            IpAddr::V6(ip) => format!("http://[{}]:{}{}", ip, self.port, self.path),
            IpAddr::V4(ip) => format!("http://{}:{}{}", ip, self.port, self.path),
        }
    }
}

/// One wire shape of the invite.
pub trait InviteStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// HTTP method and URL, for the operator
    fn describe(&self, device: &DeviceAddress) -> (&'static str, String);

    fn build(&self, client: &Client, device: &DeviceAddress, invite: &InviteRequest) -> RequestBuilder;

    /// Whether the device exposes `/ota/status` after accepting the invite.
    fn reports_status(&self) -> bool {
        true
    }
}

#[derive(Serialize)]
struct JsonInviteBody<'a> {
    #[serde(rename = "MD5")]
    md5: &'a str,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
}

/// `POST /ota` with `{"MD5", "url", "version"}`
pub struct JsonPostInvite;

impl InviteStrategy for JsonPostInvite {
    fn name(&self) -> &'static str {
        "json"
    }

    fn describe(&self, device: &DeviceAddress) -> (&'static str, String) {
        ("POST", device.endpoint("/ota"))
    }

    fn build(&self, client: &Client, device: &DeviceAddress, invite: &InviteRequest) -> RequestBuilder {
        let body = JsonInviteBody {
            md5: &invite.md5,
            url: invite.url(),
            version: invite.version.as_deref(),
        };
        client.post(device.endpoint("/ota")).json(&body)
    }
}

/// Characters escaped in query values. The device reads values raw, so `/`
/// and `:` must reach it unescaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/')
    .remove(b':');

/// `GET /?MD5=..&host=..&port=..&path=..`, answered after flashing
pub struct QueryGetInvite;

impl QueryGetInvite {
    fn query_string(invite: &InviteRequest) -> String {
        let host = invite.host.to_string();
        let port = invite.port.to_string();
        [
            ("MD5", invite.md5.as_str()),
            ("host", host.as_str()),
            ("port", port.as_str()),
            ("path", invite.path.as_str()),
        ]
        .iter()
        .map(|(key, value)| format!("{}={}", key, utf8_percent_encode(value, QUERY_VALUE)))
        .collect::<Vec<_>>()
        .join("&")
    }
}

impl InviteStrategy for QueryGetInvite {
    fn name(&self) -> &'static str {
        "query"
    }

    fn describe(&self, device: &DeviceAddress) -> (&'static str, String) {
        ("GET", device.endpoint("/"))
    }

    fn build(&self, client: &Client, device: &DeviceAddress, invite: &InviteRequest) -> RequestBuilder {
        let url = format!("{}?{}", device.endpoint("/"), Self::query_string(invite));
        client.get(url)
    }

    fn reports_status(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InviteFormat {
    /// JSON POST to /ota, then poll /ota/status
    #[default]
    Json,
    /// Query-string GET to /, device answers once flashed
    Query,
}

impl InviteFormat {
    pub fn strategy(self) -> Box<dyn InviteStrategy> {
        match self {
            InviteFormat::Json => Box::new(JsonPostInvite),
            InviteFormat::Query => Box::new(QueryGetInvite),
        }
    }
}

/// Send the invite once. Anything but HTTP 200 is fatal.
pub async fn send_invite(
    client: &Client,
    strategy: &dyn InviteStrategy,
    device: &DeviceAddress,
    invite: &InviteRequest,
    timeout: Duration,
    reporter: &dyn Reporter,
) -> Result<()> {
    let (method, url) = strategy.describe(device);
    log::debug!("Invite ({}) for {} md5={}", strategy.name(), invite.url(), invite.md5);
    reporter.invite_sent(method, &url);

    let response = strategy
        .build(client, device, invite)
        .timeout(timeout)
        .send()
        .await?;

    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            log::debug!("Could not read invite response body: {}", e);
            String::new()
        }
    };
    let body = body.trim();
    reporter.invite_answered(status, body);

    if status != 200 {
        return Err(OtaError::InviteRejected {
            status,
            body: body.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn invite() -> InviteRequest {
        InviteRequest::new(
            "9e107d9d372bb6826bd81d3542a419d6",
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            40123,
            "firmware.bin",
        )
        .with_version("1.4.0")
    }

    #[test]
    fn test_invite_url() {
        assert_eq!(invite().url(), "http://192.168.1.20:40123/firmware.bin");
        let v6 = InviteRequest::new("x", "::1".parse().unwrap(), 8000, "/fw.bin");
        assert_eq!(v6.url(), "http://[::1]:8000/fw.bin");
    }

    #[test]
    fn test_json_body_shape() {
        let req = invite();
        let body = JsonInviteBody {
            md5: &req.md5,
            url: req.url(),
            version: req.version.as_deref(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "MD5": "9e107d9d372bb6826bd81d3542a419d6",
                "url": "http://192.168.1.20:40123/firmware.bin",
                "version": "1.4.0",
            })
        );
    }

    #[test]
    fn test_query_request_shape() {
        let client = Client::new();
        let device = DeviceAddress::new("10.0.0.7", 80);
        let request = QueryGetInvite.build(&client, &device, &invite()).build().unwrap();
        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(
            request.url().as_str(),
            "http://10.0.0.7/?MD5=9e107d9d372bb6826bd81d3542a419d6&host=192.168.1.20&port=40123&path=/firmware.bin"
        );
    }

    #[test]
    fn test_query_values_rebuild_download_url() {
        // The device splices the raw values into "http://{host}:{port}{path}"
        let client = Client::new();
        let device = DeviceAddress::new("10.0.0.7", 80);
        let request = QueryGetInvite.build(&client, &device, &invite()).build().unwrap();
        let query = request.url().query().unwrap();
        let raw = |key: &str| {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix(key).and_then(|v| v.strip_prefix('=')))
                .unwrap()
                .to_string()
        };
        let rebuilt = format!("http://{}:{}{}", raw("host"), raw("port"), raw("path"));
        assert_eq!(rebuilt, invite().url());
    }

    #[test]
    fn test_query_escapes_separators_in_names() {
        let req = InviteRequest::new("abc", "10.0.0.2".parse().unwrap(), 8000, "fw&v=2 #1.bin");
        assert_eq!(
            QueryGetInvite::query_string(&req),
            "MD5=abc&host=10.0.0.2&port=8000&path=/fw%26v%3D2%20%231.bin"
        );
    }

    #[derive(Default)]
    struct Answers(std::sync::Mutex<Vec<(u16, String)>>);

    impl Reporter for Answers {
        fn invite_answered(&self, status: u16, body: &str) {
            self.0.lock().unwrap().push((status, body.to_string()));
        }

        fn status_changed(&self, _report: &crate::ota::status::StatusReport) {}
    }

    #[tokio::test]
    async fn test_truncated_answer_body_still_accepts() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            // promises 100 bytes, sends 2
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nOK")
                .await;
        });

        let answers = Answers::default();
        let device = DeviceAddress::new("127.0.0.1", port);
        send_invite(
            &Client::new(),
            &JsonPostInvite,
            &device,
            &invite(),
            Duration::from_secs(5),
            &answers,
        )
        .await
        .unwrap();

        assert_eq!(*answers.0.lock().unwrap(), vec![(200, String::new())]);
    }

    #[test]
    fn test_format_selects_strategy() {
        assert_eq!(InviteFormat::default().strategy().name(), "json");
        assert!(InviteFormat::Json.strategy().reports_status());
        assert!(!InviteFormat::Query.strategy().reports_status());
    }
}
