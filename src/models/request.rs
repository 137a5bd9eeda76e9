//! Payment request descriptors carried as `solana:` URLs.
//!
//! Two shapes exist. A transfer request names the recipient directly and lets the
//! wallet build a plain transfer; a transaction request points at an `https` link
//! the wallet calls to obtain a ready-made transaction.

use super::pubkey::Pubkey;
use crate::error::RequestUrlError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::{form_urlencoded, Url};

pub const PROTOCOL: &str = "solana:";
pub const MAX_URL_LENGTH: usize = 2048;

/// The parameters a payer must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub recipient: Pubkey,
    pub amount: Option<Decimal>,
    pub spl_token: Option<Pubkey>,
    #[serde(default)]
    pub references: Vec<Pubkey>,
    pub label: Option<String>,
    pub message: Option<String>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub link: Url,
    pub label: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentRequest {
    Transfer(TransferRequest),
    Transaction(TransactionRequest),
}

impl TransferRequest {
    pub fn new(recipient: Pubkey) -> Self {
        Self {
            recipient,
            amount: None,
            spl_token: None,
            references: Vec::new(),
            label: None,
            message: None,
            memo: None,
        }
    }

    pub fn encode(&self) -> Result<Url, RequestUrlError> {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(amount) = self.amount {
            query.append_pair("amount", &format_amount(amount));
        }
        if let Some(spl_token) = &self.spl_token {
            query.append_pair("spl-token", &spl_token.to_string());
        }
        for reference in &self.references {
            query.append_pair("reference", &reference.to_string());
        }
        append_optional(&mut query, "label", self.label.as_deref());
        append_optional(&mut query, "message", self.message.as_deref());
        append_optional(&mut query, "memo", self.memo.as_deref());

        build_url(&self.recipient.to_string(), query.finish())
    }
}

impl TransactionRequest {
    pub fn encode(&self) -> Result<Url, RequestUrlError> {
        let link = self.link.as_str();
        let pathname = if self.link.query().is_some() {
            encode_uri_component(&link.replacen("/?", "?", 1))
        } else {
            link.trim_end_matches('/').to_string()
        };

        let mut query = form_urlencoded::Serializer::new(String::new());
        append_optional(&mut query, "label", self.label.as_deref());
        append_optional(&mut query, "message", self.message.as_deref());

        build_url(&pathname, query.finish())
    }
}

impl PaymentRequest {
    pub fn encode(&self) -> Result<Url, RequestUrlError> {
        match self {
            PaymentRequest::Transfer(request) => request.encode(),
            PaymentRequest::Transaction(request) => request.encode(),
        }
    }
}

/// Prints an amount with exactly its own decimal places (no trailing zeroes).
pub fn format_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// Parses a `solana:` URL into either request shape.
pub fn parse_url(input: &str) -> Result<PaymentRequest, RequestUrlError> {
    if input.len() > MAX_URL_LENGTH {
        return Err(RequestUrlError::TooLong);
    }
    let Some(rest) = input.strip_prefix(PROTOCOL) else {
        return Err(RequestUrlError::InvalidProtocol);
    };

    let (pathname, query) = rest.split_once('?').unwrap_or((rest, ""));
    let pathname = decode_uri_component(pathname)?;
    if pathname.is_empty() {
        return Err(RequestUrlError::MissingPathname);
    }

    let params: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let first = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };

    if pathname.contains(':') {
        let link = Url::parse(&pathname).map_err(|_| RequestUrlError::InvalidLink)?;
        if link.scheme() != "https" {
            return Err(RequestUrlError::InvalidLink);
        }
        return Ok(PaymentRequest::Transaction(TransactionRequest {
            link,
            label: first("label"),
            message: first("message"),
        }));
    }

    let recipient =
        Pubkey::from_str(&pathname).map_err(|_| RequestUrlError::InvalidRecipient)?;

    let amount = first("amount").map(|a| parse_amount(&a)).transpose()?;
    let spl_token = first("spl-token")
        .map(|t| Pubkey::from_str(&t).map_err(|_| RequestUrlError::InvalidSplToken))
        .transpose()?;
    let references = params
        .iter()
        .filter(|(k, _)| k == "reference")
        .map(|(_, v)| Pubkey::from_str(v).map_err(|_| RequestUrlError::InvalidReference))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PaymentRequest::Transfer(TransferRequest {
        recipient,
        amount,
        spl_token,
        references,
        label: first("label"),
        message: first("message"),
        memo: first("memo"),
    }))
}

fn parse_amount(value: &str) -> Result<Decimal, RequestUrlError> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(RequestUrlError::InvalidAmount);
    }
    let amount = Decimal::from_str(value).map_err(|_| RequestUrlError::InvalidAmount)?;
    if amount.is_sign_negative() {
        return Err(RequestUrlError::InvalidAmount);
    }
    Ok(amount)
}

fn append_optional(
    query: &mut form_urlencoded::Serializer<'_, String>,
    key: &str,
    value: Option<&str>,
) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        query.append_pair(key, value);
    }
}

fn build_url(pathname: &str, query: String) -> Result<Url, RequestUrlError> {
    let mut raw = format!("{}{}", PROTOCOL, pathname);
    if !query.is_empty() {
        raw.push('?');
        raw.push_str(&query);
    }
    if raw.len() > MAX_URL_LENGTH {
        return Err(RequestUrlError::TooLong);
    }
    Url::parse(&raw).map_err(|e| RequestUrlError::Malformed(e.to_string()))
}

// Same escaping rules as ECMAScript's encodeURIComponent, which wallets decode against.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode_uri_component(input: &str) -> String {
    utf8_percent_encode(input, URI_COMPONENT).to_string()
}

/// Strict counterpart of [`encode_uri_component`]: every `%` must start a two-digit hex escape.
fn decode_uri_component(input: &str) -> Result<String, RequestUrlError> {
    let malformed = || RequestUrlError::Malformed(input.to_string());
    let bytes = input.as_bytes();
    for (i, _) in bytes.iter().enumerate().filter(|(_, b)| **b == b'%') {
        let escape = bytes.get(i + 1..i + 3).ok_or_else(malformed)?;
        if !escape.iter().all(u8::is_ascii_hexdigit) {
            return Err(malformed());
        }
    }
    percent_decode_str(input)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| malformed())
}
