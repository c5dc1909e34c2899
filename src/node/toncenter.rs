//! toncenter v2 HTTP client
//!
//! JSON-RPC style endpoints wrapped in `{ "ok": bool, "result": .. }`.
//! No retries here: a failed request surfaces as `NodeError::Transport`
//! or `NodeError::Rpc` and the caller decides.

use async_trait::async_trait;
use num_bigint::BigInt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{AccountState, BlockRef, MessageSummary, NodeClient, NodeError, StackEntry, Transaction};
use crate::tlb::{boc, Address, Coins};

pub const DEFAULT_ENDPOINT: &str = "https://toncenter.com/api/v2";

const API_KEY_HEADER: &str = "X-API-Key";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const TRANSACTIONS_PAGE: u32 = 16;

#[derive(Debug, Clone)]
pub struct ToncenterClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MasterchainInfo {
    last: BlockIdExt,
}

#[derive(Debug, Deserialize)]
struct BlockIdExt {
    workchain: i32,
    shard: String,
    seqno: u32,
}

#[derive(Debug, Deserialize)]
struct RunGetMethodResult {
    exit_code: i64,
    stack: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AddressInformation {
    balance: String,
    last_transaction_id: TransactionId,
}

#[derive(Debug, Deserialize)]
struct TransactionId {
    lt: String,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    utime: u64,
    transaction_id: TransactionId,
    in_msg: Option<RawMessage>,
    #[serde(default)]
    out_msgs: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    source: String,
    #[serde(default)]
    destination: String,
    #[serde(default)]
    value: String,
}

impl ToncenterClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T, NodeError> {
        let url = format!("{}/{}", self.endpoint, method);
        let response = self
            .request(self.http.get(&url).query(query))
            .send()
            .await
            .map_err(|e| NodeError::Transport(format!("{}: {}", method, e)))?;
        unwrap_envelope(method, response).await
    }

    async fn post<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, NodeError> {
        let url = format!("{}/{}", self.endpoint, method);
        let response = self
            .request(self.http.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| NodeError::Transport(format!("{}: {}", method, e)))?;
        unwrap_envelope(method, response).await
    }

    /// One page of transactions, newest first, strictly above `to_lt`
    async fn transactions_page(
        &self,
        address: &Address,
        before: Option<&(u64, String)>,
        to_lt: u64,
    ) -> Result<Vec<Transaction>, NodeError> {
        let mut query = vec![
            ("address", address.to_string()),
            ("limit", TRANSACTIONS_PAGE.to_string()),
            ("to_lt", to_lt.to_string()),
            ("archival", "false".to_string()),
        ];
        if let Some((lt, hash)) = before {
            query.push(("lt", lt.to_string()));
            query.push(("hash", hash.clone()));
        }
        let raw: Vec<RawTransaction> = self.get("getTransactions", &query).await?;
        raw.into_iter().map(parse_transaction).collect()
    }

    /// Every transaction above `after_lt`, oldest first
    async fn transactions_since(
        &self,
        address: &Address,
        after_lt: u64,
    ) -> Result<Vec<Transaction>, NodeError> {
        let mut collected: Vec<Transaction> = Vec::new();
        let mut cursor: Option<(u64, String)> = None;
        loop {
            let page = self.transactions_page(address, cursor.as_ref(), after_lt).await?;
            let full_page = page.len() as u32 >= TRANSACTIONS_PAGE;
            // paging with lt/hash repeats the boundary transaction
            let fresh: Vec<Transaction> = page
                .into_iter()
                .filter(|tx| tx.lt > after_lt)
                .filter(|tx| cursor.as_ref().map_or(true, |(lt, _)| tx.lt < *lt))
                .collect();
            let oldest = fresh.last().map(|tx| (tx.lt, tx.hash.clone()));
            collected.extend(fresh);
            match oldest {
                Some(oldest) if full_page => cursor = Some(oldest),
                _ => break,
            }
        }
        collected.sort_by_key(|tx| tx.lt);
        Ok(collected)
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> Result<T, NodeError> {
    let status = response.status();
    let envelope: Envelope<T> = response.json().await.map_err(|e| {
        NodeError::UnexpectedResponse(format!("{} (HTTP {}): {}", method, status, e))
    })?;
    if !envelope.ok {
        return Err(NodeError::Rpc {
            code: envelope.code.unwrap_or(status.as_u16() as i64),
            message: envelope.error.unwrap_or_else(|| "unknown error".to_string()),
        });
    }
    envelope
        .result
        .ok_or_else(|| NodeError::UnexpectedResponse(format!("{}: missing result", method)))
}

#[async_trait]
impl NodeClient for ToncenterClient {
    async fn masterchain_info(&self) -> Result<BlockRef, NodeError> {
        let info: MasterchainInfo = self.get("getMasterchainInfo", &[]).await?;
        let shard = info.last.shard.parse().map_err(|_| {
            NodeError::UnexpectedResponse(format!("invalid shard {:?}", info.last.shard))
        })?;
        Ok(BlockRef {
            workchain: info.last.workchain,
            shard,
            seqno: info.last.seqno,
        })
    }

    async fn run_get_method(
        &self,
        block: &BlockRef,
        address: &Address,
        method: &str,
        args: Vec<StackEntry>,
    ) -> Result<Vec<StackEntry>, NodeError> {
        let stack = args
            .iter()
            .map(encode_stack_entry)
            .collect::<Result<Vec<_>, _>>()?;
        let body = json!({
            "address": address.to_string(),
            "method": method,
            "stack": stack,
            "seqno": block.seqno,
        });
        tracing::debug!("runGetMethod {} on {} at seqno {}", method, address, block.seqno);

        let result: RunGetMethodResult = self.post("runGetMethod", body).await?;
        // 0 and 1 are both successful TVM exits
        if result.exit_code != 0 && result.exit_code != 1 {
            return Err(NodeError::GetMethodFailed {
                method: method.to_string(),
                exit_code: result.exit_code,
            });
        }
        result.stack.iter().map(parse_stack_entry).collect()
    }

    async fn get_account(
        &self,
        block: &BlockRef,
        address: &Address,
    ) -> Result<AccountState, NodeError> {
        let info: AddressInformation = self
            .get(
                "getAddressInformation",
                &[
                    ("address", address.to_string()),
                    ("seqno", block.seqno.to_string()),
                ],
            )
            .await?;
        let hash = info.last_transaction_id.hash;
        Ok(AccountState {
            balance: parse_coins(&info.balance)?,
            last_transaction_lt: parse_u64(&info.last_transaction_id.lt)?,
            last_transaction_hash: (!hash.is_empty()).then_some(hash),
        })
    }

    async fn subscribe_transactions(
        &self,
        address: &Address,
        from_lt: u64,
        sink: mpsc::Sender<Transaction>,
    ) -> Result<(), NodeError> {
        let mut last_seen = from_lt;
        tracing::debug!("Polling transactions of {} from lt {}", address, from_lt);
        loop {
            for tx in self.transactions_since(address, last_seen).await? {
                last_seen = last_seen.max(tx.lt);
                if sink.send(tx).await.is_err() {
                    return Ok(());
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = sink.closed() => return Ok(()),
            }
        }
    }
}

fn encode_stack_entry(entry: &StackEntry) -> Result<Value, NodeError> {
    match entry {
        StackEntry::Int(value) => Ok(json!(["num", value.to_string()])),
        StackEntry::Cell(cell) => Ok(json!(["tvm.Cell", boc::to_base64(cell)?])),
        StackEntry::Slice(cell) => Ok(json!(["tvm.Slice", boc::to_base64(cell)?])),
        other => Err(NodeError::UnexpectedResponse(format!(
            "{} arguments are not supported",
            other.kind()
        ))),
    }
}

/// Parse a `[type, value]` stack entry as returned by `runGetMethod`
fn parse_stack_entry(raw: &Value) -> Result<StackEntry, NodeError> {
    let unexpected = || NodeError::UnexpectedResponse(format!("stack entry {}", raw));
    let pair = raw.as_array().ok_or_else(unexpected)?;
    let (kind, value) = match pair.as_slice() {
        [kind, value] => (kind.as_str().ok_or_else(unexpected)?, value),
        _ => return Err(unexpected()),
    };

    match kind {
        "num" | "int" => {
            let text = value.as_str().ok_or_else(unexpected)?;
            Ok(StackEntry::Int(parse_hex_int(text)?))
        }
        "cell" | "tvm.Cell" => Ok(StackEntry::Cell(parse_boc_value(value)?)),
        "slice" | "tvm.Slice" => Ok(StackEntry::Slice(parse_boc_value(value)?)),
        "null" => Ok(StackEntry::Null),
        "tuple" | "list" => {
            let elements = value
                .get("elements")
                .and_then(Value::as_array)
                .ok_or_else(unexpected)?;
            elements
                .iter()
                .map(parse_typed_entry)
                .collect::<Result<Vec<_>, _>>()
                .map(StackEntry::Tuple)
        }
        _ => Err(unexpected()),
    }
}

/// Parse a tonlib-typed entry (`tvm.stackEntry*`) as found inside tuples
fn parse_typed_entry(raw: &Value) -> Result<StackEntry, NodeError> {
    let unexpected = || NodeError::UnexpectedResponse(format!("tuple element {}", raw));
    match raw.get("@type").and_then(Value::as_str) {
        Some("tvm.stackEntryNumber") => {
            let text = raw
                .pointer("/number/number")
                .and_then(Value::as_str)
                .ok_or_else(unexpected)?;
            BigInt::parse_bytes(text.as_bytes(), 10)
                .map(StackEntry::Int)
                .ok_or_else(unexpected)
        }
        Some("tvm.stackEntryCell") => Ok(StackEntry::Cell(parse_boc_value(
            raw.get("cell").ok_or_else(unexpected)?,
        )?)),
        Some("tvm.stackEntrySlice") => Ok(StackEntry::Slice(parse_boc_value(
            raw.get("slice").ok_or_else(unexpected)?,
        )?)),
        Some("tvm.stackEntryTuple") | Some("tvm.stackEntryList") => {
            let elements = raw
                .pointer("/tuple/elements")
                .or_else(|| raw.pointer("/list/elements"))
                .and_then(Value::as_array)
                .ok_or_else(unexpected)?;
            elements
                .iter()
                .map(parse_typed_entry)
                .collect::<Result<Vec<_>, _>>()
                .map(StackEntry::Tuple)
        }
        Some("tvm.stackEntryNull") => Ok(StackEntry::Null),
        _ => Err(unexpected()),
    }
}

/// Cells come either as `{"bytes": "<base64>"}` or a bare base64 string
fn parse_boc_value(value: &Value) -> Result<crate::tlb::Cell, NodeError> {
    let encoded = value
        .get("bytes")
        .and_then(Value::as_str)
        .or_else(|| value.as_str())
        .ok_or_else(|| NodeError::UnexpectedResponse(format!("cell value {}", value)))?;
    Ok(boc::from_base64(encoded)?)
}

/// `0x1f`, `-0x1f`
fn parse_hex_int(text: &str) -> Result<BigInt, NodeError> {
    let invalid = || NodeError::UnexpectedResponse(format!("integer {:?}", text));
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x") {
        Some(hex) => BigInt::parse_bytes(hex.as_bytes(), 16),
        None => BigInt::parse_bytes(digits.as_bytes(), 10),
    }
    .ok_or_else(invalid)?;
    Ok(if negative { -value } else { value })
}

fn parse_u64(text: &str) -> Result<u64, NodeError> {
    text.parse()
        .map_err(|_| NodeError::UnexpectedResponse(format!("integer {:?}", text)))
}

fn parse_coins(text: &str) -> Result<Coins, NodeError> {
    if text.is_empty() {
        return Ok(Coins::ZERO);
    }
    Ok(text.parse()?)
}

fn parse_message(raw: RawMessage) -> Result<MessageSummary, NodeError> {
    Ok(MessageSummary {
        source: (!raw.source.is_empty()).then_some(raw.source),
        destination: (!raw.destination.is_empty()).then_some(raw.destination),
        value: parse_coins(&raw.value)?,
    })
}

fn parse_transaction(raw: RawTransaction) -> Result<Transaction, NodeError> {
    Ok(Transaction {
        lt: parse_u64(&raw.transaction_id.lt)?,
        hash: raw.transaction_id.hash,
        utime: raw.utime,
        in_message: raw.in_msg.map(parse_message).transpose()?,
        out_messages: raw
            .out_msgs
            .into_iter()
            .map(parse_message)
            .collect::<Result<Vec<_>, _>>()?,
    })
}
