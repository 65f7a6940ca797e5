//! Wire protocol: request payloads begin with a one-byte message-type code,
//! response payloads begin with a one-byte status code. Everything rides
//! inside length-prefixed tagged frames (`frame`).

pub mod frame;

use std::collections::HashSet;
use std::io::Cursor;

use crate::encoding;
use crate::error::{Error, Result};

pub const MSG_REGISTER: u8 = 1;
pub const MSG_LOGIN: u8 = 2;
pub const MSG_ADD_EVENT: u8 = 10;
pub const MSG_NEW_DAY: u8 = 11;
pub const MSG_QUANTITY: u8 = 20;
pub const MSG_VOLUME: u8 = 21;
pub const MSG_AVG_PRICE: u8 = 22;
pub const MSG_MAX_PRICE: u8 = 23;
pub const MSG_FILTER_EVENTS: u8 = 30;
pub const MSG_SIMULTANEOUS: u8 = 40;
pub const MSG_CONSECUTIVE: u8 = 41;

pub const STATUS_OK: u8 = 0;
pub const STATUS_ERROR: u8 = 1;
pub const STATUS_AUTH_FAILED: u8 = 2;
pub const STATUS_USER_EXISTS: u8 = 3;
pub const STATUS_NOT_AUTHENTICATED: u8 = 4;
pub const STATUS_INVALID_DAY: u8 = 5;
pub const STATUS_NO_DATA: u8 = 6;

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Register { username: String, password: String },
    Login { username: String, password: String },
    AddEvent { product: String, quantity: i32, price: f64 },
    NewDay,
    Quantity { product: String, lookback: i32 },
    Volume { product: String, lookback: i32 },
    AveragePrice { product: String, lookback: i32 },
    MaxPrice { product: String, lookback: i32 },
    FilterEvents { lookback: i32, products: HashSet<String> },
    WaitSimultaneous { first: String, second: String },
    WaitConsecutive { run: i32 },
}

impl Request {
    /// Only register and login may be sent before authentication.
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Request::Register { .. } | Request::Login { .. })
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(payload);
        let code = encoding::read_u8(&mut r)?;

        let request = match code {
            MSG_REGISTER => Request::Register {
                username: encoding::read_str(&mut r)?,
                password: encoding::read_str(&mut r)?,
            },
            MSG_LOGIN => Request::Login {
                username: encoding::read_str(&mut r)?,
                password: encoding::read_str(&mut r)?,
            },
            MSG_ADD_EVENT => Request::AddEvent {
                product: encoding::read_str(&mut r)?,
                quantity: encoding::read_i32(&mut r)?,
                price: encoding::read_f64(&mut r)?,
            },
            MSG_NEW_DAY => Request::NewDay,
            MSG_QUANTITY => Request::Quantity {
                product: encoding::read_str(&mut r)?,
                lookback: encoding::read_i32(&mut r)?,
            },
            MSG_VOLUME => Request::Volume {
                product: encoding::read_str(&mut r)?,
                lookback: encoding::read_i32(&mut r)?,
            },
            MSG_AVG_PRICE => Request::AveragePrice {
                product: encoding::read_str(&mut r)?,
                lookback: encoding::read_i32(&mut r)?,
            },
            MSG_MAX_PRICE => Request::MaxPrice {
                product: encoding::read_str(&mut r)?,
                lookback: encoding::read_i32(&mut r)?,
            },
            MSG_FILTER_EVENTS => {
                let lookback = encoding::read_i32(&mut r)?;
                let count = encoding::read_u32(&mut r)?;
                let mut products = HashSet::with_capacity(count as usize);
                for _ in 0..count {
                    products.insert(encoding::read_str(&mut r)?);
                }
                Request::FilterEvents { lookback, products }
            }
            MSG_SIMULTANEOUS => Request::WaitSimultaneous {
                first: encoding::read_str(&mut r)?,
                second: encoding::read_str(&mut r)?,
            },
            MSG_CONSECUTIVE => Request::WaitConsecutive {
                run: encoding::read_i32(&mut r)?,
            },
            other => return Err(Error::UnknownMessage(other)),
        };
        Ok(request)
    }

    /// Client-side encoding, also the reference for tests.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut w = Vec::new();
        match self {
            Request::Register { username, password } => {
                encoding::write_u8(&mut w, MSG_REGISTER)?;
                encoding::write_str(&mut w, username)?;
                encoding::write_str(&mut w, password)?;
            }
            Request::Login { username, password } => {
                encoding::write_u8(&mut w, MSG_LOGIN)?;
                encoding::write_str(&mut w, username)?;
                encoding::write_str(&mut w, password)?;
            }
            Request::AddEvent { product, quantity, price } => {
                encoding::write_u8(&mut w, MSG_ADD_EVENT)?;
                encoding::write_str(&mut w, product)?;
                encoding::write_i32(&mut w, *quantity)?;
                encoding::write_f64(&mut w, *price)?;
            }
            Request::NewDay => encoding::write_u8(&mut w, MSG_NEW_DAY)?,
            Request::Quantity { product, lookback } => {
                encoding::write_u8(&mut w, MSG_QUANTITY)?;
                encoding::write_str(&mut w, product)?;
                encoding::write_i32(&mut w, *lookback)?;
            }
            Request::Volume { product, lookback } => {
                encoding::write_u8(&mut w, MSG_VOLUME)?;
                encoding::write_str(&mut w, product)?;
                encoding::write_i32(&mut w, *lookback)?;
            }
            Request::AveragePrice { product, lookback } => {
                encoding::write_u8(&mut w, MSG_AVG_PRICE)?;
                encoding::write_str(&mut w, product)?;
                encoding::write_i32(&mut w, *lookback)?;
            }
            Request::MaxPrice { product, lookback } => {
                encoding::write_u8(&mut w, MSG_MAX_PRICE)?;
                encoding::write_str(&mut w, product)?;
                encoding::write_i32(&mut w, *lookback)?;
            }
            Request::FilterEvents { lookback, products } => {
                encoding::write_u8(&mut w, MSG_FILTER_EVENTS)?;
                encoding::write_i32(&mut w, *lookback)?;
                encoding::write_u32(&mut w, products.len() as u32)?;
                for product in products {
                    encoding::write_str(&mut w, product)?;
                }
            }
            Request::WaitSimultaneous { first, second } => {
                encoding::write_u8(&mut w, MSG_SIMULTANEOUS)?;
                encoding::write_str(&mut w, first)?;
                encoding::write_str(&mut w, second)?;
            }
            Request::WaitConsecutive { run } => {
                encoding::write_u8(&mut w, MSG_CONSECUTIVE)?;
                encoding::write_i32(&mut w, *run)?;
            }
        }
        Ok(w)
    }
}

/// Response payload under construction: status byte first, fields after.
pub struct ResponseWriter {
    buf: Vec<u8>,
}

impl ResponseWriter {
    pub fn with_status(status: u8) -> Self {
        Self { buf: vec![status] }
    }

    pub fn push_bool(mut self, value: bool) -> Self {
        encoding::write_bool(&mut self.buf, value).expect("vec write");
        self
    }

    pub fn push_u32(mut self, value: u32) -> Self {
        encoding::write_u32(&mut self.buf, value).expect("vec write");
        self
    }

    pub fn push_i32(mut self, value: i32) -> Self {
        encoding::write_i32(&mut self.buf, value).expect("vec write");
        self
    }

    pub fn push_f64(mut self, value: f64) -> Self {
        encoding::write_f64(&mut self.buf, value).expect("vec write");
        self
    }

    pub fn push_str(mut self, value: &str) -> Self {
        encoding::write_str(&mut self.buf, value).expect("vec write");
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads a response payload; mirrors `ResponseWriter` for clients and tests.
pub struct ResponseReader<'a> {
    cursor: Cursor<&'a [u8]>,
    status: u8,
}

impl<'a> ResponseReader<'a> {
    pub fn new(payload: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let status = encoding::read_u8(&mut cursor)?;
        Ok(Self { cursor, status })
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        encoding::read_bool(&mut self.cursor)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        encoding::read_u32(&mut self.cursor)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        encoding::read_i32(&mut self.cursor)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        encoding::read_f64(&mut self.cursor)
    }

    pub fn read_str(&mut self) -> Result<String> {
        encoding::read_str(&mut self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let requests = vec![
            Request::Register {
                username: "ana".into(),
                password: "secret".into(),
            },
            Request::AddEvent {
                product: "apple".into(),
                quantity: 3,
                price: 1.25,
            },
            Request::NewDay,
            Request::Quantity {
                product: "apple".into(),
                lookback: 7,
            },
            Request::FilterEvents {
                lookback: 2,
                products: ["apple".to_string(), "pear".to_string()]
                    .into_iter()
                    .collect(),
            },
            Request::WaitSimultaneous {
                first: "apple".into(),
                second: "pear".into(),
            },
            Request::WaitConsecutive { run: 4 },
        ];

        for request in requests {
            let decoded = Request::decode(&request.encode().unwrap()).unwrap();
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn test_unknown_message_code() {
        match Request::decode(&[99]) {
            Err(Error::UnknownMessage(99)) => {}
            other => panic!("expected unknown message, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload() {
        let payload = Request::Login {
            username: "ana".into(),
            password: "secret".into(),
        }
        .encode()
        .unwrap();
        assert!(Request::decode(&payload[..payload.len() - 2]).is_err());
    }

    #[test]
    fn test_auth_gate() {
        assert!(Request::NewDay.requires_auth());
        assert!(!Request::Register {
            username: "a".into(),
            password: "b".into()
        }
        .requires_auth());
        assert!(!Request::Login {
            username: "a".into(),
            password: "b".into()
        }
        .requires_auth());
        assert!(Request::WaitConsecutive { run: 1 }.requires_auth());
    }

    #[test]
    fn test_response_round_trip() {
        let payload = ResponseWriter::with_status(STATUS_OK)
            .push_bool(true)
            .push_str("apple")
            .push_i32(42)
            .push_f64(1.5)
            .finish();

        let mut reader = ResponseReader::new(&payload).unwrap();
        assert_eq!(reader.status(), STATUS_OK);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_str().unwrap(), "apple");
        assert_eq!(reader.read_i32().unwrap(), 42);
        assert_eq!(reader.read_f64().unwrap(), 1.5);
    }
}
