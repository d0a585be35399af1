mod hmac;

pub use hmac::{CallbackHmac, CallbackHmacService, MOBILE_MONEY_HMAC_HEADER};
