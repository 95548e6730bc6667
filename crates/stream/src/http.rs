// HTTP byte stream with Range-request reconnect

use crate::ByteStream;
use brook_core::{PlayerError, Result};
use std::io::Read;
use std::time::Duration;

/// Create a configured HTTP agent with proper timeouts and settings.
pub fn create_http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(30))
        .timeout_read(Duration::from_secs(60))
        .user_agent("Mozilla/5.0 (compatible; BrookAudioPlayer/1.0)")
        .redirects(10)
        .build()
}

/// Progressive HTTP byte stream.
///
/// Connects lazily on the first read, so `length` becomes known once bytes
/// start arriving. `reconnect` issues a Range request from the given offset
/// and validates that the server actually honored it (a 200 in place of a
/// 206 would silently restart the stream from zero and corrupt playback).
pub struct HttpByteStream {
    url: String,
    agent: ureq::Agent,
    reader: Option<Box<dyn Read + Send + Sync>>,
    total_length: Option<u64>,
}

impl HttpByteStream {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            agent: create_http_agent(),
            reader: None,
            total_length: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn connect(&mut self, offset: u64) -> Result<()> {
        self.reader = None;

        let request = if offset == 0 {
            self.agent.get(&self.url)
        } else {
            self.agent
                .get(&self.url)
                .set("Range", &format!("bytes={}-", offset))
        };

        let response = request
            .call()
            .map_err(|e| PlayerError::Network(format!("HTTP GET failed: {}", e)))?;

        if offset > 0 {
            // Validate that the server honored the Range request.
            if response.status() != 206 {
                return Err(PlayerError::Network(format!(
                    "server returned {} instead of 206 Partial Content for range request",
                    response.status()
                )));
            }
            match response.header("Content-Range") {
                Some(range) if range.starts_with(&format!("bytes {}-", offset)) => {
                    if self.total_length.is_none() {
                        self.total_length = range
                            .split('/')
                            .last()
                            .and_then(|s| s.parse::<u64>().ok());
                    }
                }
                Some(range) => {
                    return Err(PlayerError::Network(format!(
                        "Content-Range '{}' does not match requested offset {}",
                        range, offset
                    )));
                }
                None => {
                    return Err(PlayerError::Network(
                        "206 response carried no Content-Range header".to_string(),
                    ));
                }
            }
        } else {
            self.total_length = response
                .header("Content-Length")
                .and_then(|s| s.parse::<u64>().ok());
        }

        if let Some(total) = self.total_length {
            log::info!("connected to {} ({} bytes)", self.url, total);
        } else {
            log::info!("connected to {} (length unknown)", self.url);
        }

        self.reader = Some(response.into_reader());
        Ok(())
    }
}

impl ByteStream for HttpByteStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.reader.is_none() {
            self.connect(0)?;
        }
        match self.reader.as_mut() {
            Some(reader) => reader
                .read(buf)
                .map_err(|e| PlayerError::Network(format!("download failed: {}", e))),
            None => Err(PlayerError::Network("no active connection".to_string())),
        }
    }

    fn length(&self) -> Option<u64> {
        self.total_length
    }

    fn reconnect(&mut self, offset: u64) -> Result<()> {
        log::debug!("reconnecting to {} from byte {}", self.url, offset);
        self.connect(offset)
    }
}
