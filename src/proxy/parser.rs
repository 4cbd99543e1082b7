//! Proxy parser module for parsing candidates from plain-text lists

use crate::proxy::models::{Candidate, ProxyType};
use crate::Result;
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

static URL_FORMAT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(https?|socks[45]h?)://([^:/\s]+):(\d{1,5})/?$")
        .expect("Invalid proxy URL regex")
});

/// Proxy parser for parsing candidates from strings and files
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy line
    ///
    /// Supports formats:
    /// - IP:PORT
    /// - scheme://IP:PORT
    ///
    /// Port 0 is rejected.
    pub fn parse_line(line: &str, default_type: ProxyType) -> Option<Candidate> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        Self::parse_url_format(line).or_else(|| Self::parse_colon_format(line, default_type))
    }

    /// Parse URL format proxy (e.g., http://ip:port or socks5://ip:port)
    fn parse_url_format(line: &str) -> Option<Candidate> {
        let caps = URL_FORMAT_REGEX.captures(line)?;

        let protocol = match caps[1].to_lowercase().as_str() {
            "http" => ProxyType::Http,
            "https" => ProxyType::Https,
            "socks4" | "socks4h" => ProxyType::Socks4,
            "socks5" | "socks5h" => ProxyType::Socks5,
            _ => return None,
        };

        let port = Self::parse_port(&caps[3])?;
        Some(Candidate::new(&caps[2], port, protocol))
    }

    /// Parse ip:port format
    fn parse_colon_format(line: &str, default_type: ProxyType) -> Option<Candidate> {
        let (host, port) = line.split_once(':')?;
        let host = host.trim();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return None;
        }
        let port = Self::parse_port(port)?;
        Some(Candidate::new(host, port, default_type))
    }

    /// Parse a port in 1..=65535
    pub fn parse_port(s: &str) -> Option<u16> {
        match s.trim().parse::<u16>() {
            Ok(0) | Err(_) => None,
            Ok(port) => Some(port),
        }
    }

    /// Parse candidates from a string (multiple lines)
    pub fn parse_string(content: &str, default_type: ProxyType) -> Vec<Candidate> {
        content
            .lines()
            .filter_map(|line| Self::parse_line(line, default_type))
            .collect()
    }

    /// Parse candidates from a file
    pub fn parse_file<P: AsRef<Path>>(path: P, default_type: ProxyType) -> Result<Vec<Candidate>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read proxy list {}", path.display()))?;
        Ok(Self::parse_string(&content, default_type))
    }

    /// Save candidates to a file in scheme://IP:PORT format
    pub fn save_to_file<P: AsRef<Path>>(candidates: &[Candidate], path: P) -> Result<()> {
        let path = path.as_ref();
        let mut content: String = candidates
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        content.push('\n');

        fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))?;
        Ok(())
    }
}
