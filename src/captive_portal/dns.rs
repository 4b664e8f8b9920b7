//! DNS 劫持
//!
//! 把 AP 网络上的所有 DNS 查询都解析到 AP 自身地址，
//! 手机和电脑的联网检测请求因此都会落到配网页面。
//! 不做上游转发，无法解析的报文直接丢弃。

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

const HEADER_LEN: usize = 12;
const MAX_PACKET_LEN: usize = 512;
const MAX_NAME_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;
/// 每次 pump 最多处理的报文数，持续的查询流也不能卡住服务循环
const MAX_PACKETS_PER_PUMP: usize = 16;

const FLAG_QR: u16 = 0x8000;
const FLAG_AA: u16 = 0x0400;
const FLAG_RD: u16 = 0x0100;
const OPCODE_MASK: u16 = 0x7800;
const RCODE_NXDOMAIN: u16 = 3;

const TYPE_A: u16 = 1;
const TYPE_ANY: u16 = 255;
const CLASS_IN: u16 = 1;

/// 指向报文偏移 12 处的问题名称
const NAME_POINTER: [u8; 2] = [0xC0, 0x0C];

pub const DEFAULT_TTL: u32 = 60;

#[derive(Debug, PartialEq)]
struct Question {
    name: String,
    qtype: u16,
    /// 第一个问题在报文中的结束位置
    end: usize,
}

fn read_u16(packet: &[u8], at: usize) -> Option<u16> {
    let bytes = packet.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn parse_question(packet: &[u8]) -> Option<Question> {
    if packet.len() < HEADER_LEN {
        return None;
    }

    let flags = read_u16(packet, 2)?;
    if flags & FLAG_QR != 0 || flags & OPCODE_MASK != 0 {
        return None;
    }
    if read_u16(packet, 4)? == 0 {
        return None;
    }

    let mut name = String::new();
    let mut pos = HEADER_LEN;
    loop {
        let len = *packet.get(pos)? as usize;
        pos += 1;
        if len == 0 {
            break;
        }
        // 查询报文的问题部分不应出现压缩指针
        if len > MAX_LABEL_LEN {
            return None;
        }
        let label = packet.get(pos..pos + len)?;
        pos += len;

        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(&String::from_utf8_lossy(label));
        if name.len() > MAX_NAME_LEN {
            return None;
        }
    }

    let qtype = read_u16(packet, pos)?;
    read_u16(packet, pos + 2)?;

    Some(Question {
        name,
        qtype,
        end: pos + 4,
    })
}

fn matches_pattern(pattern: &str, name: &str) -> bool {
    pattern == "*" || pattern.trim_end_matches('.').eq_ignore_ascii_case(name)
}

/// 为一个查询报文构造应答，报文无法解析时返回 `None`。
///
/// 只回答第一个问题；A/ANY 查询返回一条指向 `address` 的 A 记录，
/// 其它类型返回空应答，让客户端回退到 A 查询。
pub fn build_reply(query: &[u8], pattern: &str, address: Ipv4Addr, ttl: u32) -> Option<Vec<u8>> {
    let question = parse_question(query)?;
    let flags = read_u16(query, 2)?;

    let matched = matches_pattern(pattern, &question.name);
    let answer = matched && matches!(question.qtype, TYPE_A | TYPE_ANY);
    let rcode = if matched { 0 } else { RCODE_NXDOMAIN };

    let mut reply = Vec::with_capacity(question.end + 16);
    reply.extend_from_slice(&query[..2]);
    reply.extend_from_slice(&(FLAG_QR | FLAG_AA | (flags & FLAG_RD) | rcode).to_be_bytes());
    reply.extend_from_slice(&1u16.to_be_bytes());
    reply.extend_from_slice(&u16::from(answer).to_be_bytes());
    reply.extend_from_slice(&0u16.to_be_bytes());
    reply.extend_from_slice(&0u16.to_be_bytes());
    reply.extend_from_slice(&query[HEADER_LEN..question.end]);

    if answer {
        reply.extend_from_slice(&NAME_POINTER);
        reply.extend_from_slice(&TYPE_A.to_be_bytes());
        reply.extend_from_slice(&CLASS_IN.to_be_bytes());
        reply.extend_from_slice(&ttl.to_be_bytes());
        reply.extend_from_slice(&4u16.to_be_bytes());
        reply.extend_from_slice(&address.octets());
    }

    Some(reply)
}

pub struct CaptiveResponder {
    socket: Option<UdpSocket>,
    pattern: String,
    address: Ipv4Addr,
    ttl: u32,
}

impl Default for CaptiveResponder {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl CaptiveResponder {
    pub fn new(ttl: u32) -> Self {
        Self {
            socket: None,
            pattern: "*".to_string(),
            address: Ipv4Addr::UNSPECIFIED,
            ttl,
        }
    }

    /// 绑定 UDP 端口，之后的查询都解析为 `address`
    pub fn start(&mut self, port: u16, pattern: &str, address: Ipv4Addr) -> anyhow::Result<()> {
        self.stop();

        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_nonblocking(true)?;

        log::info!(
            "DNS responder listening on {}, {:?} -> {}",
            socket.local_addr()?,
            pattern,
            address
        );

        self.socket = Some(socket);
        self.pattern = pattern.to_string();
        self.address = address;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.socket.is_some()
    }

    pub fn local_port(&self) -> Option<u16> {
        let socket = self.socket.as_ref()?;
        socket.local_addr().ok().map(|addr| addr.port())
    }

    /// 处理已排队的查询，不阻塞，单次最多 `MAX_PACKETS_PER_PUMP` 个。返回发出的应答数。
    pub fn pump(&mut self) -> usize {
        let Some(socket) = &self.socket else {
            return 0;
        };

        let mut buf = [0u8; MAX_PACKET_LEN];
        let mut replied = 0;

        for _ in 0..MAX_PACKETS_PER_PUMP {
            let (len, peer) = match socket.recv_from(&mut buf) {
                Ok(r) => r,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("DNS receive failed: {}", e);
                    break;
                }
            };

            let Some(reply) = build_reply(&buf[..len], &self.pattern, self.address, self.ttl) else {
                log::debug!("Dropped malformed DNS packet from {} ({} bytes)", peer, len);
                continue;
            };

            match socket.send_to(&reply, peer) {
                Ok(_) => replied += 1,
                Err(e) => log::warn!("Failed to send DNS reply to {}: {}", peer, e),
            }
        }

        replied
    }

    pub fn stop(&mut self) {
        if self.socket.take().is_some() {
            log::info!("DNS responder stopped");
        }
    }
}
