//! SoftAP + Web 配网模块
//!
//! DNS 劫持把所有域名解析到 AP 地址，HTTP 服务对任意路径返回配网表单。

mod dns;
mod handlers;
mod html;
#[cfg(target_os = "espidf")]
mod server;

pub use dns::{build_reply, CaptiveResponder, DEFAULT_TTL};
pub use handlers::{
    decide, parse_form, parse_submission, read_body, route, Effect, HttpMethod, Page, Portal,
    Reply, Route, SessionEvent, SharedStore, SubmitError, CONTENT_TYPE, MAX_BODY_LEN,
};
#[cfg(target_os = "espidf")]
pub use server::{PortalHttpServer, SoftAp, AP_IP};

#[cfg(test)]
pub(crate) use dns::tests as dns_tests;
