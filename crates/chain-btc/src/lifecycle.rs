//! Transaction lifecycle.
//!
//! A transaction moves through
//!
//! ```text
//! NewTx -> UnsignedTx -> SignedTx -> OnlineSignedTx -> SentTx
//!                            |                           |
//!                            +--------> BumpTx <---------+
//!                                         |
//!                                         +--> UnsignedTx
//! ```
//!
//! Each state is its own type and each transition consumes its input, so a
//! signed transaction cannot be modified and an unsigned one cannot be sent.
//! Everything the daemon returns is checked against the local model before
//! the next state is produced.

use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, info, warn};

use crate::amount::Amount;
use crate::codec::{deserialize_hex, DeserializedTx};
use crate::config::TxConfig;
use crate::error::{BtcError, ErrorClass, RejectKind};
use crate::fee::{check_fee_bounds, fee_from_kb_rate, relay_fee, FeeSpec};
use crate::integrity::{check_serialized_integrity, check_sigs};
use crate::io::{TxInput, TxOutput};
use crate::params::{ChainParams, Locktime, LOCKTIME_SEQUENCE, MAX_SEQUENCE, RBF_SEQUENCE};
use crate::resolve::{resolve_outputs, AddressBook, OutputSpec};
use crate::rpc::{DaemonSession, RpcTransport};
use crate::signer::{build_sig_data, SigningKey};
use crate::size::{check_vsize, estimate, SizeEstimate};
use crate::sort::{sort_inputs, sort_outputs};
use crate::status::{probe_status, TxStatus};

/// Longest comment accepted, in characters.
pub const MAX_COMMENT_LEN: usize = 72;

/// Current time truncated to whole seconds, as stored in transaction files.
pub fn now_secs() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Sequence number for new inputs.
pub fn sequence_for(params: &ChainParams, cfg: &TxConfig) -> u32 {
    if params.supports_rbf && !cfg.no_rbf {
        RBF_SEQUENCE
    } else if cfg.locktime.is_some_and(|lt| lt > 0) {
        LOCKTIME_SEQUENCE
    } else {
        MAX_SEQUENCE
    }
}

/// Inputs, outputs and locktime of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TxData {
    pub params: ChainParams,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
    pub comment: Option<String>,
}

impl TxData {
    pub fn input_total(&self) -> Result<Amount, BtcError> {
        Amount::sum(self.inputs.iter().map(|i| i.amount))
    }

    pub fn output_total(&self) -> Result<Amount, BtcError> {
        Amount::sum(self.outputs.iter().map(|o| o.amount))
    }

    /// Inputs minus outputs.
    pub fn fee(&self) -> Result<Amount, BtcError> {
        let (ins, outs) = (self.input_total()?, self.output_total()?);
        ins.checked_sub(outs).ok_or(BtcError::InsufficientFunds {
            needed: outs,
            available: ins,
        })
    }

    /// Total of non-change outputs; the single output's amount when there
    /// is only one.
    pub fn send_amount(&self) -> Result<Amount, BtcError> {
        if let [only] = self.outputs.as_slice() {
            return Ok(only.amount);
        }
        Amount::sum(self.outputs.iter().filter(|o| !o.is_change).map(|o| o.amount))
    }

    pub fn change_idx(&self) -> Option<usize> {
        self.outputs.iter().position(|o| o.is_change)
    }

    /// Replace-by-fee is signalled by the first input's sequence.
    pub fn is_replaceable(&self) -> bool {
        self.inputs.first().map(TxInput::effective_sequence) == Some(RBF_SEQUENCE)
    }

    pub fn has_segwit(&self) -> bool {
        self.inputs.iter().any(TxInput::is_segwit)
            || self.outputs.iter().any(|o| o.is_segwit(&self.params))
    }

    pub fn estimate(&self, cfg: &TxConfig) -> Result<SizeEstimate, BtcError> {
        estimate(&self.inputs, &self.outputs, &self.params, cfg.vsize_adj)?
            .ok_or(BtcError::EmptyTransaction)
    }

    /// At most one data output and one change output, in distinct outputs.
    pub fn check_roles(&self) -> Result<(), BtcError> {
        let data = self.outputs.iter().filter(|o| o.dest.is_data()).count();
        let change = self.outputs.iter().filter(|o| o.is_change).count();
        if data > 1 {
            return Err(BtcError::InvalidOutputSpec("more than one data output".into()));
        }
        if change > 1 {
            return Err(BtcError::InvalidOutputSpec("more than one change output".into()));
        }
        if self.outputs.iter().any(|o| o.is_change && o.dest.is_data()) {
            return Err(BtcError::InvalidOutputSpec("data output marked as change".into()));
        }
        Ok(())
    }

    pub fn check_comment(&self) -> Result<(), BtcError> {
        match &self.comment {
            Some(c) if c.chars().count() > MAX_COMMENT_LEN => Err(BtcError::InvalidTransaction(
                format!("comment longer than {MAX_COMMENT_LEN} characters"),
            )),
            _ => Ok(()),
        }
    }
}

/// A serialized transaction and its content id.
///
/// The content id is a checksum of the canonical unsigned bytes. It is set
/// when the record is created and carried unchanged through signing and
/// broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct TxRecord {
    pub data: TxData,
    /// Transaction hex: unsigned before signing, signed after.
    serialized: String,
    content_id: String,
    pub timestamp: DateTime<Utc>,
    /// Chain height when the transaction was created.
    pub blockcount: u64,
}

impl TxRecord {
    pub fn from_parts(
        data: TxData,
        serialized: String,
        content_id: String,
        timestamp: DateTime<Utc>,
        blockcount: u64,
    ) -> Self {
        TxRecord {
            data,
            serialized,
            content_id,
            timestamp,
            blockcount,
        }
    }

    pub fn serialized(&self) -> &str {
        &self.serialized
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn deserialize(&self) -> Result<DeserializedTx, BtcError> {
        deserialize_hex(&self.serialized, &self.data.params)
    }

    /// Check serialized bytes against the model and content id.
    pub fn check_integrity(&self, dtx: &DeserializedTx) -> Result<(), BtcError> {
        check_serialized_integrity(
            &self.data.inputs,
            &self.data.outputs,
            self.data.locktime,
            &self.content_id,
            dtx,
            &self.data.params,
        )
    }
}

/// Have the daemon build the unsigned bytes for `data` and assign the
/// content id.
async fn construct<T: RpcTransport>(
    data: TxData,
    session: &DaemonSession<T>,
) -> Result<UnsignedTx, BtcError> {
    data.check_roles()?;
    let tx_hex = session
        .create_raw_transaction(&data.inputs, &data.outputs, data.locktime)
        .await?;
    let dtx = deserialize_hex(&tx_hex, &data.params)?;
    let content_id = dtx.content_id();
    check_serialized_integrity(
        &data.inputs,
        &data.outputs,
        data.locktime,
        &content_id,
        &dtx,
        &data.params,
    )?;
    info!(%content_id, inputs = data.inputs.len(), outputs = data.outputs.len(), "created unsigned transaction");
    Ok(UnsignedTx {
        record: TxRecord::from_parts(data, tx_hex, content_id, now_secs(), session.info().blockcount),
    })
}

/// A transaction being assembled: candidate inputs and output specs.
#[derive(Debug, Clone)]
pub struct NewTx {
    params: ChainParams,
    unspent: Vec<TxInput>,
    specs: Vec<OutputSpec>,
    comment: Option<String>,
}

impl NewTx {
    pub fn new(params: ChainParams) -> Self {
        NewTx {
            params,
            unspent: Vec::new(),
            specs: Vec::new(),
            comment: None,
        }
    }

    /// Offer unspent outputs for input selection. An outpoint may be
    /// offered only once.
    pub fn add_unspent(&mut self, inputs: impl IntoIterator<Item = TxInput>) -> Result<(), BtcError> {
        for input in inputs {
            let dup = self
                .unspent
                .iter()
                .any(|u| u.vout == input.vout && u.txid.eq_ignore_ascii_case(&input.txid));
            if dup {
                return Err(BtcError::DuplicateInput(format!("{}:{}", input.txid, input.vout)));
            }
            self.unspent.push(input);
        }
        Ok(())
    }

    pub fn add_output(&mut self, spec: OutputSpec) {
        self.specs.push(spec);
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) -> Result<(), BtcError> {
        let comment = comment.into();
        if comment.chars().count() > MAX_COMMENT_LEN {
            return Err(BtcError::InvalidTransaction(format!(
                "comment longer than {MAX_COMMENT_LEN} characters"
            )));
        }
        self.comment = Some(comment);
        Ok(())
    }

    /// Resolve outputs, select inputs, settle the fee and have the daemon
    /// build the unsigned transaction.
    ///
    /// Inputs are taken largest first until they cover the payments and the
    /// fee for the inputs chosen so far. A user fee is checked against the
    /// relay and maximum fees before any construction call.
    pub async fn create<T: RpcTransport, B: AddressBook + ?Sized>(
        self,
        session: &DaemonSession<T>,
        book: &B,
        cfg: &TxConfig,
        fee: Option<FeeSpec>,
    ) -> Result<UnsignedTx, BtcError> {
        let params = self.params;
        session.check_chain(&params)?;
        if self.specs.is_empty() || self.unspent.is_empty() {
            return Err(BtcError::EmptyTransaction);
        }

        let mut outputs = resolve_outputs(&self.specs, book, &params).await?;
        if !session.info().segwit_active {
            if let Some(o) = outputs.iter().find(|o| o.is_segwit(&params)) {
                return Err(BtcError::SegwitUnsupported(format!(
                    "segwit output {} requested, but segwit is not active on this chain",
                    o.dest
                )));
            }
        }
        let send = Amount::sum(outputs.iter().filter(|o| !o.is_change).map(|o| o.amount))?;

        let rate = match fee {
            Some(_) => None,
            None => Some(
                session
                    .estimate_fee_rate(cfg.fee_estimate_confs, cfg.fee_estimate_mode)
                    .await?,
            ),
        };
        let fee_for = |vsize: u64| -> Result<Amount, BtcError> {
            match (fee, rate) {
                (Some(spec), _) => spec.to_absolute(vsize),
                (None, Some(r)) => Ok(fee_from_kb_rate(r, vsize, cfg.fee_adjust)),
                (None, None) => Err(BtcError::NoFeeEstimate("no fee rate".into())),
            }
        };

        let sequence = sequence_for(&params, cfg);
        let mut candidates = self.unspent;
        candidates.sort_by(|a, b| b.amount.cmp(&a.amount));

        let mut inputs: Vec<TxInput> = Vec::new();
        let mut settled = None;
        for mut input in candidates {
            input.sequence = (sequence != MAX_SEQUENCE).then_some(sequence);
            inputs.push(input);
            let est = estimate(&inputs, &outputs, &params, cfg.vsize_adj)?.ok_or(BtcError::EmptyTransaction)?;
            let tx_fee = fee_for(est.vsize)?;
            check_fee_bounds(
                tx_fee,
                relay_fee(session.info().relay_fee_per_kb, est.vsize),
                params.max_tx_fee,
            )?;
            let total = Amount::sum(inputs.iter().map(|i| i.amount))?;
            if send.checked_add(tx_fee).is_some_and(|needed| total >= needed) {
                settled = Some((total, tx_fee));
                break;
            }
        }
        let available = Amount::sum(inputs.iter().map(|i| i.amount))?;
        let Some((total, tx_fee)) = settled else {
            let est = estimate(&inputs, &outputs, &params, cfg.vsize_adj)?.ok_or(BtcError::EmptyTransaction)?;
            return Err(BtcError::InsufficientFunds {
                needed: send.checked_add(fee_for(est.vsize)?).unwrap_or(send),
                available,
            });
        };

        let leftover = total.checked_sub(send).and_then(|x| x.checked_sub(tx_fee)).unwrap_or(Amount::ZERO);
        let chg_idx = outputs.iter().position(|o| o.is_change).ok_or(BtcError::NoChangeOutput)?;
        if leftover.is_zero() {
            debug!("no change left, dropping change output");
            outputs.remove(chg_idx);
        } else {
            outputs[chg_idx].amount = leftover;
        }

        sort_inputs(&mut inputs)?;
        sort_outputs(&mut outputs, &params)?;
        let locktime = cfg.locktime.unwrap_or(0);
        if let Some(lt) = Locktime::from_consensus(locktime) {
            info!(locktime = %lt, "setting locktime");
        }
        let data = TxData {
            params,
            inputs,
            outputs,
            locktime,
            comment: self.comment,
        };
        info!(fee = %data.fee()?, send = %send, "settled transaction fee");
        construct(data, session).await
    }
}

/// An unsigned transaction with an assigned content id.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTx {
    record: TxRecord,
}

/// Result of a signing attempt.
#[derive(Debug)]
pub enum SignOutcome {
    Signed(SignedTx),
    /// The signer failed or could not complete; the transaction is handed
    /// back unchanged so a batch can go on.
    Failed { tx: UnsignedTx, reason: String },
}

impl UnsignedTx {
    pub fn from_record(record: TxRecord) -> Self {
        UnsignedTx { record }
    }

    pub fn record(&self) -> &TxRecord {
        &self.record
    }

    pub fn into_record(self) -> TxRecord {
        self.record
    }

    /// Sign through the daemon and check what comes back.
    ///
    /// Signer errors are returned as [`SignOutcome::Failed`]; structural
    /// problems with the signed bytes are errors.
    pub async fn sign<T: RpcTransport>(
        self,
        session: &DaemonSession<T>,
        keys: &[SigningKey],
        cfg: &TxConfig,
    ) -> Result<SignOutcome, BtcError> {
        let data = &self.record.data;
        let params = data.params;
        session.check_chain(&params)?;
        if data.has_segwit() && !(params.supports_segwit && session.info().segwit_active) {
            return Err(BtcError::SegwitUnsupported(format!(
                "segwit is not active on this {} daemon",
                params.coin
            )));
        }
        for input in &data.inputs {
            input.check_script_pubkey(&params)?;
        }
        let sig_data = build_sig_data(&data.inputs, keys, &params)?;

        let signed = session
            .sign_raw_transaction(&self.record.serialized, keys, sig_data, params.sighash_type)
            .await;
        let reply = match signed {
            Ok(r) => r,
            Err(e) if e.class() == ErrorClass::External => {
                warn!(content_id = %self.record.content_id, error = %e, "signing failed");
                return Ok(SignOutcome::Failed {
                    reason: e.to_string(),
                    tx: self,
                });
            }
            Err(e) => return Err(e),
        };
        if !reply.complete {
            warn!(content_id = %self.record.content_id, "signing incomplete");
            return Ok(SignOutcome::Failed {
                tx: self,
                reason: "failed to sign transaction".into(),
            });
        }

        let dtx = deserialize_hex(&reply.hex, &params)?;
        self.record.check_integrity(&dtx)?;
        check_sigs(&dtx)?;
        let decoded = session.decode_raw_transaction(&reply.hex).await?;
        check_vsize(self.record.data.estimate(cfg)?.vsize, decoded.vsize_or_size())?;
        if decoded.txid != dtx.txid {
            return Err(BtcError::CoinTxIdMismatch {
                expected: dtx.txid,
                actual: decoded.txid,
            });
        }

        info!(content_id = %self.record.content_id, coin_txid = %dtx.txid, "signed transaction");
        let mut record = self.record;
        record.serialized = reply.hex;
        Ok(SignOutcome::Signed(SignedTx {
            record,
            coin_txid: dtx.txid,
        }))
    }
}

/// A signed transaction, not yet checked against an online daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTx {
    record: TxRecord,
    coin_txid: String,
}

impl SignedTx {
    /// Rebuild from stored parts. The caller has verified `record` with
    /// [`TxRecord::check_integrity`] and [`check_sigs`].
    pub fn from_parts(record: TxRecord, coin_txid: String) -> Self {
        SignedTx { record, coin_txid }
    }

    pub fn record(&self) -> &TxRecord {
        &self.record
    }

    pub fn coin_txid(&self) -> &str {
        &self.coin_txid
    }

    /// Check the transaction against the online daemon before sending.
    pub async fn go_online<T: RpcTransport>(
        self,
        session: &DaemonSession<T>,
    ) -> Result<OnlineSignedTx, BtcError> {
        let data = &self.record.data;
        session.check_chain(&data.params)?;
        if data.has_segwit() && !session.info().segwit_active {
            return Err(BtcError::SegwitUnsupported(
                "transaction has segwit inputs or outputs, but segwit is not active on this chain".into(),
            ));
        }
        let fee = data.fee()?;
        if fee > data.params.max_tx_fee {
            return Err(BtcError::FeeTooHigh {
                fee,
                max: data.params.max_tx_fee,
            });
        }
        let decoded = session.decode_raw_transaction(&self.record.serialized).await?;
        if decoded.txid != self.coin_txid {
            return Err(BtcError::CoinTxIdMismatch {
                expected: self.coin_txid,
                actual: decoded.txid,
            });
        }
        debug!(coin_txid = %self.coin_txid, "signed transaction checked against daemon");
        Ok(OnlineSignedTx { signed: self })
    }
}

/// A signed transaction checked against the daemon it will be sent to.
#[derive(Debug, Clone, PartialEq)]
pub struct OnlineSignedTx {
    signed: SignedTx,
}

impl OnlineSignedTx {
    pub fn signed(&self) -> &SignedTx {
        &self.signed
    }

    /// Broadcast. The daemon's txid must be the one computed at signing.
    pub async fn send<T: RpcTransport>(self, session: &DaemonSession<T>) -> Result<SentTx, BtcError> {
        let txid = session
            .send_raw_transaction(&self.signed.record.serialized)
            .await
            .inspect_err(|e| match (e, Locktime::from_consensus(self.signed.record.data.locktime)) {
                (BtcError::BroadcastRejected { kind: RejectKind::NonFinal, .. }, Some(lt)) => {
                    warn!(error = %e, locktime = %lt, "locktime not reached, transaction cannot be mined yet")
                }
                _ => warn!(error = %e, "broadcast failed"),
            })?;
        if txid != self.signed.coin_txid {
            return Err(BtcError::CoinTxIdMismatch {
                expected: self.signed.coin_txid,
                actual: txid,
            });
        }
        info!(coin_txid = %txid, "transaction sent");
        Ok(SentTx {
            signed: self.signed,
            sent_timestamp: now_secs(),
        })
    }
}

/// A broadcast transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SentTx {
    signed: SignedTx,
    pub sent_timestamp: DateTime<Utc>,
}

impl SentTx {
    pub fn from_parts(signed: SignedTx, sent_timestamp: DateTime<Utc>) -> Self {
        SentTx { signed, sent_timestamp }
    }

    pub fn signed(&self) -> &SignedTx {
        &self.signed
    }

    pub fn record(&self) -> &TxRecord {
        &self.signed.record
    }

    pub fn coin_txid(&self) -> &str {
        &self.signed.coin_txid
    }

    pub async fn status<T: RpcTransport>(&self, session: &DaemonSession<T>) -> Result<TxStatus, BtcError> {
        probe_status(session, &self.signed.coin_txid).await
    }
}

/// A replace-by-fee bump of a signed or sent transaction.
///
/// Inputs keep their order and sequences; one output pays for the higher
/// fee.
#[derive(Debug, Clone, PartialEq)]
pub struct BumpTx {
    orig: SignedTx,
}

impl BumpTx {
    pub fn from_signed(tx: SignedTx) -> Result<Self, BtcError> {
        if !tx.record.data.params.supports_rbf || !tx.record.data.is_replaceable() {
            return Err(BtcError::NotReplaceable);
        }
        Ok(BumpTx { orig: tx })
    }

    pub fn from_sent(tx: SentTx) -> Result<Self, BtcError> {
        Self::from_signed(tx.signed)
    }

    pub fn original(&self) -> &SignedTx {
        &self.orig
    }

    /// Lowest acceptable new fee: the old fee plus the relay fee.
    pub fn min_fee(&self, relay_fee_per_kb: Amount, cfg: &TxConfig) -> Result<Amount, BtcError> {
        let data = &self.orig.record.data;
        let vsize = data.estimate(cfg)?.vsize;
        data.fee()?
            .checked_add(relay_fee(relay_fee_per_kb, vsize))
            .ok_or_else(|| BtcError::InvalidAmount("fee overflows".into()))
    }

    /// Take the fee increase out of output `output_idx` and build the
    /// replacement.
    pub async fn create<T: RpcTransport>(
        self,
        session: &DaemonSession<T>,
        output_idx: usize,
        fee: FeeSpec,
        cfg: &TxConfig,
    ) -> Result<UnsignedTx, BtcError> {
        let mut data = self.orig.record.data.clone();
        session.check_chain(&data.params)?;

        let out = data
            .outputs
            .get(output_idx)
            .filter(|o| !o.dest.is_data())
            .ok_or(BtcError::InvalidOutputIndex(output_idx))?;
        let vsize = data.estimate(cfg)?.vsize;
        let new_fee = fee.to_absolute(vsize)?;
        check_fee_bounds(
            new_fee,
            self.min_fee(session.info().relay_fee_per_kb, cfg)?,
            data.params.max_tx_fee,
        )?;

        let old_fee = data.fee()?;
        let new_amount = new_fee
            .checked_sub(old_fee)
            .and_then(|delta| out.amount.checked_sub(delta))
            .filter(|a| !a.is_zero())
            .ok_or(BtcError::OutputTooSmall {
                idx: output_idx,
                amount: out.amount,
                fee: new_fee,
            })?;
        data.outputs[output_idx].amount = new_amount;
        sort_outputs(&mut data.outputs, &data.params)?;
        info!(old_fee = %old_fee, new_fee = %new_fee, output_idx, "bumping transaction fee");
        construct(data, session).await
    }
}

/// A transaction in any state.
#[derive(Debug)]
pub enum TxState {
    New(NewTx),
    Unsigned(UnsignedTx),
    Signed(SignedTx),
    OnlineSigned(OnlineSignedTx),
    Sent(SentTx),
    Bump(BumpTx),
}

impl TxState {
    pub fn name(&self) -> &'static str {
        match self {
            TxState::New(_) => "new",
            TxState::Unsigned(_) => "unsigned",
            TxState::Signed(_) => "signed",
            TxState::OnlineSigned(_) => "online-signed",
            TxState::Sent(_) => "sent",
            TxState::Bump(_) => "bump",
        }
    }

    pub fn record(&self) -> Option<&TxRecord> {
        match self {
            TxState::New(_) => None,
            TxState::Unsigned(t) => Some(t.record()),
            TxState::Signed(t) => Some(t.record()),
            TxState::OnlineSigned(t) => Some(t.signed().record()),
            TxState::Sent(t) => Some(t.record()),
            TxState::Bump(t) => Some(t.original().record()),
        }
    }
}
