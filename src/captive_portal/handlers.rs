//! HTTP 路由处理
//!
//! 每个路由都是纯函数：请求 -> 页面 + 声明的副作用，
//! 副作用（保存凭据并重启）由 [`Portal`] 统一执行。

use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;

use super::html;
use crate::store::{CredentialStore, Credentials, KvStore, PASSWORD_KEY, SSID_KEY};

pub const CONTENT_TYPE: &str = "text/html";

/// 请求体上限，超过即按非法提交处理
pub const MAX_BODY_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// GET /
    Index,
    /// POST /config
    Config,
    /// 其它任意请求，Captive Portal 检测也落在这里
    CatchAll,
}

pub fn route(method: HttpMethod, uri: &str) -> Route {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    match (method, path) {
        (HttpMethod::Get, "/") => Route::Index,
        (HttpMethod::Post, "/config") => Route::Config,
        _ => Route::CatchAll,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Form,
    Success,
    Error,
}

impl Page {
    pub fn html(self) -> &'static str {
        match self {
            Page::Form => html::FORM_HTML,
            Page::Success => html::SUCCESS_HTML,
            Page::Error => html::ERROR_HTML,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub page: Page,
    /// 凭据已保存，页面发出后需要重启
    pub restart: bool,
}

impl Reply {
    fn ok(page: Page) -> Self {
        Self {
            status: 200,
            page,
            restart: false,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Effect {
    None,
    PersistAndRestart(Credentials),
}

/// 提交被拒绝的原因
#[derive(Debug, PartialEq)]
pub enum SubmitError {
    Missing(&'static str),
    Empty(&'static str),
    Body(String),
    TooLarge(usize),
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::Missing(field) => write!(f, "missing field {}", field),
            SubmitError::Empty(field) => write!(f, "empty field {}", field),
            SubmitError::Body(msg) => write!(f, "unreadable body: {}", msg),
            SubmitError::TooLarge(len) => {
                write!(f, "body exceeds {} bytes (got {})", MAX_BODY_LEN, len)
            }
        }
    }
}

impl std::error::Error for SubmitError {}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// application/x-www-form-urlencoded 解码，非法的 `%` 转义按原样保留
fn decode_component(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hi = bytes.get(i + 1).copied().and_then(hex_value);
                let lo = bytes.get(i + 2).copied().and_then(hex_value);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push(hi << 4 | lo);
                    i += 2;
                } else {
                    out.push(b'%');
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub fn parse_form(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

#[derive(Deserialize)]
struct JsonSubmission {
    ssid: Option<String>,
    password: Option<String>,
}

fn require(field: &'static str, value: Option<String>) -> Result<String, SubmitError> {
    match value {
        None => Err(SubmitError::Missing(field)),
        // 不做 trim，只检查原始值是否为空
        Some(v) if v.is_empty() => Err(SubmitError::Empty(field)),
        Some(v) => Ok(v),
    }
}

/// 读取请求体，最多读到 `MAX_BODY_LEN + 1` 字节。
/// 多出的那一个字节让 [`parse_submission`] 能识别出超长的请求体，不会把截断的内容当成完整提交。
pub fn read_body<E>(mut read: impl FnMut(&mut [u8]) -> Result<usize, E>) -> Result<Vec<u8>, E> {
    let mut body = Vec::new();
    let mut buf = [0u8; 256];

    while body.len() <= MAX_BODY_LEN {
        let want = (MAX_BODY_LEN + 1 - body.len()).min(buf.len());
        let len = read(&mut buf[..want])?;
        if len == 0 {
            break;
        }
        body.extend_from_slice(&buf[..len]);
    }

    Ok(body)
}

/// 解析 POST /config 的请求体，支持表单和 JSON
pub fn parse_submission(content_type: Option<&str>, body: &[u8]) -> Result<Credentials, SubmitError> {
    if body.len() > MAX_BODY_LEN {
        return Err(SubmitError::TooLarge(body.len()));
    }

    let is_json = content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);

    let (ssid, password) = if is_json {
        let submission: JsonSubmission =
            serde_json::from_slice(body).map_err(|e| SubmitError::Body(e.to_string()))?;
        (submission.ssid, submission.password)
    } else {
        let body = std::str::from_utf8(body).map_err(|e| SubmitError::Body(e.to_string()))?;
        let fields = parse_form(body);
        let field = |name: &str| {
            fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };
        (field(SSID_KEY), field(PASSWORD_KEY))
    };

    Ok(Credentials::new(
        require(SSID_KEY, ssid)?,
        require(PASSWORD_KEY, password)?,
    ))
}

/// 路由决策，不触碰任何状态
pub fn decide(route: Route, content_type: Option<&str>, body: &[u8]) -> (Reply, Effect) {
    match route {
        Route::Index | Route::CatchAll => (Reply::ok(Page::Form), Effect::None),
        Route::Config => match parse_submission(content_type, body) {
            Ok(credentials) => (
                Reply::ok(Page::Success),
                Effect::PersistAndRestart(credentials),
            ),
            Err(e) => {
                log::warn!("Rejected config submission: {}", e);
                (Reply::ok(Page::Error), Effect::None)
            }
        },
    }
}

/// 配网会话与 HTTP 处理器共享的凭据存储，提交成功后被取走并关闭
pub type SharedStore<N> = Arc<Mutex<Option<CredentialStore<N>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Restart,
}

pub struct Portal<N: KvStore> {
    store: SharedStore<N>,
    events: UnboundedSender<SessionEvent>,
}

impl<N: KvStore> Clone for Portal<N> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            events: self.events.clone(),
        }
    }
}

impl<N: KvStore> Portal<N> {
    pub fn new(store: SharedStore<N>, events: UnboundedSender<SessionEvent>) -> Self {
        Self { store, events }
    }

    pub fn handle(
        &self,
        method: HttpMethod,
        uri: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Reply {
        let route = route(method, uri);
        log::info!("{:?} {} -> {:?}", method, uri, route);

        let (reply, effect) = decide(route, content_type, body);
        match effect {
            Effect::None => reply,
            Effect::PersistAndRestart(credentials) => match self.commit(&credentials) {
                Ok(()) => Reply {
                    restart: true,
                    ..reply
                },
                Err(e) => {
                    log::error!("Failed to store credentials: {:?}", e);
                    Reply::ok(Page::Error)
                }
            },
        }
    }

    /// 响应已经写给客户端之后调用；需要重启时才通知会话，
    /// 保证成功页面在热点关闭之前发出去。
    pub fn finish(&self, reply: Reply) {
        if !reply.restart {
            return;
        }
        if self.events.send(SessionEvent::Restart).is_err() {
            log::error!("Provisioning session is gone, restart not scheduled");
        }
    }

    /// 保存凭据并关闭存储
    fn commit(&self, credentials: &Credentials) -> anyhow::Result<()> {
        let mut guard = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut store) = guard.take() else {
            anyhow::bail!("credentials were already submitted");
        };

        if let Err(e) = store.save(credentials) {
            *guard = Some(store);
            return Err(e.into());
        }
        drop(guard);

        // 两个键都已写入，关闭失败也照常重启
        if let Err(e) = store.close() {
            log::error!("Failed to close credential store: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryNamespace, MemoryPartition};
    use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};

    const FORM: Option<&str> = Some("application/x-www-form-urlencoded");

    fn portal(
        partition: &MemoryPartition,
    ) -> (Portal<MemoryNamespace>, UnboundedReceiver<SessionEvent>) {
        let store = CredentialStore::open(partition, "wifi").unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        (Portal::new(Arc::new(Mutex::new(Some(store))), tx), rx)
    }

    #[test]
    fn test_route_table() {
        assert_eq!(route(HttpMethod::Get, "/"), Route::Index);
        assert_eq!(route(HttpMethod::Get, "/?lang=en"), Route::Index);
        assert_eq!(route(HttpMethod::Post, "/config"), Route::Config);
        assert_eq!(route(HttpMethod::Get, "/config"), Route::CatchAll);
        assert_eq!(route(HttpMethod::Post, "/"), Route::CatchAll);
        assert_eq!(route(HttpMethod::Get, "/generate_204"), Route::CatchAll);
        assert_eq!(route(HttpMethod::Other, "/hotspot-detect.html"), Route::CatchAll);
        assert_eq!(route(HttpMethod::Other, "/"), Route::CatchAll);
        assert_eq!(route(HttpMethod::Other, "/config"), Route::CatchAll);
    }

    #[test]
    fn test_parse_form() {
        let fields = parse_form("ssid=My+Net&password=p%40ss%26word%3D1&flag");
        assert_eq!(
            fields,
            vec![
                ("ssid".to_string(), "My Net".to_string()),
                ("password".to_string(), "p@ss&word=1".to_string()),
                ("flag".to_string(), "".to_string()),
            ]
        );

        assert_eq!(parse_form("a=100%&b=%zz"), vec![
            ("a".to_string(), "100%".to_string()),
            ("b".to_string(), "%zz".to_string()),
        ]);
        assert_eq!(parse_form("ssid=%E4%BD%A0%E5%A5%BD")[0].1, "你好");
    }

    #[test]
    fn test_parse_submission() {
        assert_eq!(
            parse_submission(FORM, b"ssid=MyNet&password=secret123"),
            Ok(Credentials::new("MyNet", "secret123"))
        );
        assert_eq!(
            parse_submission(None, b"password=secret123"),
            Err(SubmitError::Missing("ssid"))
        );
        assert_eq!(
            parse_submission(FORM, b"ssid=MyNet"),
            Err(SubmitError::Missing("password"))
        );
        assert_eq!(
            parse_submission(FORM, b"ssid=&password=secret123"),
            Err(SubmitError::Empty("ssid"))
        );
        // 空白不算空
        assert_eq!(
            parse_submission(FORM, b"ssid=+&password=+"),
            Ok(Credentials::new(" ", " "))
        );
        assert!(matches!(
            parse_submission(FORM, &[0xff, 0xfe]),
            Err(SubmitError::Body(_))
        ));
    }

    #[test]
    fn test_parse_json_submission() {
        let json = Some("application/json; charset=utf-8");
        assert_eq!(
            parse_submission(json, br#"{"ssid":"MyNet","password":"secret123"}"#),
            Ok(Credentials::new("MyNet", "secret123"))
        );
        assert_eq!(
            parse_submission(json, br#"{"ssid":"MyNet"}"#),
            Err(SubmitError::Missing("password"))
        );
        assert!(matches!(
            parse_submission(json, b"ssid=MyNet"),
            Err(SubmitError::Body(_))
        ));
    }

    #[test]
    fn test_catch_all_serves_form() {
        let partition = MemoryPartition::new();
        let (portal, mut rx) = portal(&partition);

        for uri in ["/", "/generate_204", "/favicon.ico", "/hotspot-detect.html"] {
            let reply = portal.handle(HttpMethod::Get, uri, None, b"");
            assert_eq!(reply, Reply::ok(Page::Form), "{}", uri);
        }
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert!(partition.snapshot("wifi").is_empty());
    }

    #[test]
    fn test_valid_submission_persists_and_restarts() {
        let partition = MemoryPartition::new();
        let (portal, mut rx) = portal(&partition);

        let reply = portal.handle(
            HttpMethod::Post,
            "/config",
            FORM,
            b"ssid=MyNet&password=secret123",
        );
        assert_eq!(reply.page, Page::Success);
        assert!(reply.restart);
        // 页面发出之前不通知重启
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        portal.finish(reply);
        assert_eq!(rx.try_recv(), Ok(SessionEvent::Restart));

        let stored = partition.snapshot("wifi");
        assert_eq!(stored.get("ssid").map(String::as_str), Some("MyNet"));
        assert_eq!(stored.get("password").map(String::as_str), Some("secret123"));
        assert!(portal.store.lock().unwrap().is_none());
    }

    #[test]
    fn test_invalid_submissions_change_nothing() {
        let partition = MemoryPartition::new();
        let (portal, mut rx) = portal(&partition);

        for body in [
            "ssid=&password=secret123",
            "ssid=MyNet",
            "ssid=MyNet&password=",
            "",
        ] {
            let reply = portal.handle(HttpMethod::Post, "/config", FORM, body.as_bytes());
            assert_eq!(reply, Reply::ok(Page::Error));
            portal.finish(reply);
        }

        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert!(partition.snapshot("wifi").is_empty());
        assert!(portal.store.lock().unwrap().is_some());
    }

    #[test]
    fn test_second_submission_is_rejected() {
        let partition = MemoryPartition::new();
        let (portal, mut rx) = portal(&partition);

        let first = portal.handle(HttpMethod::Post, "/config", FORM, b"ssid=MyNet&password=secret123");
        assert_eq!(first.page, Page::Success);
        portal.finish(first);
        let second = portal.handle(HttpMethod::Post, "/config", FORM, b"ssid=Other&password=hunter22");
        assert_eq!(second.page, Page::Error);
        assert!(!second.restart);
        portal.finish(second);

        assert_eq!(rx.try_recv(), Ok(SessionEvent::Restart));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(
            partition.snapshot("wifi").get("ssid").map(String::as_str),
            Some("MyNet")
        );
    }

    #[test]
    fn test_write_failure_shows_error_and_keeps_waiting() {
        let partition = MemoryPartition::new();
        partition.fail_writes_to("password");
        let (portal, mut rx) = portal(&partition);

        let reply = portal.handle(HttpMethod::Post, "/config", FORM, b"ssid=MyNet&password=secret123");
        assert_eq!(reply.page, Page::Error);
        portal.finish(reply);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert!(partition.snapshot("wifi").is_empty());
        assert!(portal.store.lock().unwrap().is_some());
    }

    /// 按块返回数据的请求体读取器
    fn chunked(data: &[u8], chunk: usize) -> impl FnMut(&mut [u8]) -> Result<usize, ()> + '_ {
        let mut pos = 0;
        move |buf: &mut [u8]| {
            let len = chunk.min(buf.len()).min(data.len() - pos);
            buf[..len].copy_from_slice(&data[pos..pos + len]);
            pos += len;
            Ok(len)
        }
    }

    #[test]
    fn test_read_body() {
        let body = b"ssid=MyNet&password=secret123";
        assert_eq!(read_body(chunked(body, 7)), Ok(body.to_vec()));

        let exact = vec![b'a'; MAX_BODY_LEN];
        assert_eq!(read_body(chunked(&exact, 100)).unwrap().len(), MAX_BODY_LEN);

        // 超长请求体只多读一个字节
        let huge = vec![b'a'; 4 * MAX_BODY_LEN];
        assert_eq!(read_body(chunked(&huge, 256)).unwrap().len(), MAX_BODY_LEN + 1);

        let mut failing = |_: &mut [u8]| Err::<usize, &str>("connection reset");
        assert_eq!(read_body(&mut failing), Err("connection reset"));
    }

    #[test]
    fn test_oversized_submission_is_rejected() {
        let partition = MemoryPartition::new();
        let (portal, mut rx) = portal(&partition);

        let mut body = b"ssid=A&password=".to_vec();
        body.resize(1100, b'x');
        let read = read_body(chunked(&body, 256)).unwrap();
        assert_eq!(
            parse_submission(FORM, &read),
            Err(SubmitError::TooLarge(MAX_BODY_LEN + 1))
        );

        let reply = portal.handle(HttpMethod::Post, "/config", FORM, &read);
        assert_eq!(reply, Reply::ok(Page::Error));
        portal.finish(reply);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert!(partition.snapshot("wifi").is_empty());

        // 刚好在上限内的仍然接受
        let mut body = b"ssid=A&password=".to_vec();
        body.resize(MAX_BODY_LEN, b'x');
        let creds = parse_submission(FORM, &body).unwrap();
        assert_eq!(creds.password.len(), MAX_BODY_LEN - "ssid=A&password=".len());
    }

    #[test]
    fn test_pages() {
        assert!(Page::Form.html().contains(r#"action="/config""#));
        assert!(Page::Form.html().contains(r#"name="ssid""#));
        assert!(Page::Form.html().contains(r#"name="password""#));
        assert!(Page::Error.html().contains(r#"href="/""#));
        assert_ne!(Page::Success.html(), Page::Error.html());
    }
}
