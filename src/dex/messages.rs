//! Swap request messages
//!
//! ```text
//! step_params#_ kind:(## 1) limit:Coins next:(Maybe ^SwapStep) = SwapStepParams;
//! step#_ pool_addr:MsgAddressInt params:SwapStepParams = SwapStep;
//! swap_params#_ deadline:uint32 recipient_addr:MsgAddressInt referral_addr:MsgAddress
//!               fulfill_payload:(Maybe ^Cell) reject_payload:(Maybe ^Cell) = SwapParams;
//!
//! swap#ea06185d query_id:uint64 amount:Coins _:SwapStep swap_params:^SwapParams = InMsgBody;
//! swap#e3a0d482 _:SwapStep swap_params:^SwapParams = ForwardPayload;
//!
//! transfer#0f8a7ea5 query_id:uint64 amount:Coins destination:MsgAddress
//!                   response_destination:MsgAddress custom_payload:(Maybe ^Cell)
//!                   forward_ton_amount:Coins forward_payload:(Either Cell ^Cell) = InMsgBody;
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::tlb::{
    expect_magic, Address, Cell, CellBuilder, CellDeserialize, CellSerialize, CellSlice,
    CodecError, Coins, TlbMessage,
};

/// Swap kind bit for "given input amount"
const SWAP_KIND_GIVEN_IN: bool = false;

/// One pool hop.
///
/// `next` chains further hops. Only single-hop swaps are built today; the
/// field keeps the wire shape for multi-hop routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapStep {
    pub pool: Address,
    /// Minimum acceptable output, zero disables the check
    pub limit: Coins,
    pub next: Option<Box<SwapStep>>,
}

impl SwapStep {
    pub fn single(pool: Address, limit: Coins) -> Self {
        Self {
            pool,
            limit,
            next: None,
        }
    }
}

impl CellSerialize for SwapStep {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), CodecError> {
        builder
            .store_address(Some(&self.pool))?
            .store_bit(SWAP_KIND_GIVEN_IN)?
            .store_coins(self.limit)?;
        let next = self.next.as_ref().map(|next| next.to_cell()).transpose()?;
        builder.store_maybe_ref(next.as_ref())?;
        Ok(())
    }
}

impl CellDeserialize for SwapStep {
    fn load(slice: &mut CellSlice) -> Result<Self, CodecError> {
        let pool = slice.load_address()?;
        if slice.load_bit()? != SWAP_KIND_GIVEN_IN {
            return Err(CodecError::MalformedMessage(
                "only given-in swap steps are supported".into(),
            ));
        }
        let limit = slice.load_coins()?;
        let next = slice
            .load_maybe_ref()?
            .map(|cell| SwapStep::from_cell(&cell).map(Box::new))
            .transpose()?;
        Ok(Self { pool, limit, next })
    }
}

/// Settlement parameters, always carried in a referenced cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    /// Unix timestamp after which the swap is rejected
    pub deadline: u32,
    pub recipient: Address,
    /// `None` encodes the none-address
    pub referral: Option<Address>,
    pub fulfill_payload: Option<Cell>,
    pub reject_payload: Option<Cell>,
}

impl SwapParams {
    /// Params with no referral and no callback payloads
    pub fn new(deadline: u32, recipient: Address) -> Self {
        Self {
            deadline,
            recipient,
            referral: None,
            fulfill_payload: None,
            reject_payload: None,
        }
    }

    /// Unix timestamp `offset` from now
    pub fn deadline_after(offset: Duration) -> u32 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        (now + offset).as_secs().min(u32::MAX as u64) as u32
    }
}

impl CellSerialize for SwapParams {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), CodecError> {
        builder
            .store_u32(self.deadline)?
            .store_address(Some(&self.recipient))?
            .store_address(self.referral.as_ref())?
            .store_maybe_ref(self.fulfill_payload.as_ref())?
            .store_maybe_ref(self.reject_payload.as_ref())?;
        Ok(())
    }
}

impl CellDeserialize for SwapParams {
    fn load(slice: &mut CellSlice) -> Result<Self, CodecError> {
        Ok(Self {
            deadline: slice.load_u32()?,
            recipient: slice.load_address()?,
            referral: slice.load_maybe_address()?,
            fulfill_payload: slice.load_maybe_ref()?,
            reject_payload: slice.load_maybe_ref()?,
        })
    }
}

/// Native-asset swap, sent straight to the native vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSwapRequest {
    pub query_id: u64,
    pub amount: Coins,
    pub step: SwapStep,
    pub params: SwapParams,
}

impl TlbMessage for NativeSwapRequest {
    const MAGIC: u32 = 0xea06185d;
}

impl CellSerialize for NativeSwapRequest {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), CodecError> {
        builder
            .store_u32(Self::MAGIC)?
            .store_u64(self.query_id)?
            .store_coins(self.amount)?;
        self.step.store(builder)?;
        builder.store_reference(self.params.to_cell()?)?;
        Ok(())
    }
}

impl CellDeserialize for NativeSwapRequest {
    fn load(slice: &mut CellSlice) -> Result<Self, CodecError> {
        expect_magic(slice, Self::MAGIC)?;
        let query_id = slice.load_u64()?;
        let amount = slice.load_coins()?;
        let step = SwapStep::load(slice)?;
        let params = SwapParams::from_cell(&slice.load_reference()?)?;
        Ok(Self {
            query_id,
            amount,
            step,
            params,
        })
    }
}

/// Swap request carried as a jetton transfer's forward payload.
/// The enclosing transfer supplies query id and amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JettonSwapRequest {
    pub step: SwapStep,
    pub params: SwapParams,
}

impl TlbMessage for JettonSwapRequest {
    const MAGIC: u32 = 0xe3a0d482;
}

impl CellSerialize for JettonSwapRequest {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), CodecError> {
        builder.store_u32(Self::MAGIC)?;
        self.step.store(builder)?;
        builder.store_reference(self.params.to_cell()?)?;
        Ok(())
    }
}

impl CellDeserialize for JettonSwapRequest {
    fn load(slice: &mut CellSlice) -> Result<Self, CodecError> {
        expect_magic(slice, Self::MAGIC)?;
        let step = SwapStep::load(slice)?;
        let params = SwapParams::from_cell(&slice.load_reference()?)?;
        Ok(Self { step, params })
    }
}

/// Standard jetton transfer, sent to the holder's jetton wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JettonTransfer {
    pub query_id: u64,
    pub amount: Coins,
    pub destination: Address,
    pub response_destination: Option<Address>,
    pub custom_payload: Option<Cell>,
    pub forward_amount: Coins,
    pub forward_payload: Cell,
}

impl TlbMessage for JettonTransfer {
    const MAGIC: u32 = 0x0f8a7ea5;
}

impl CellSerialize for JettonTransfer {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), CodecError> {
        builder
            .store_u32(Self::MAGIC)?
            .store_u64(self.query_id)?
            .store_coins(self.amount)?
            .store_address(Some(&self.destination))?
            .store_address(self.response_destination.as_ref())?
            .store_maybe_ref(self.custom_payload.as_ref())?
            .store_coins(self.forward_amount)?
            .store_either(&self.forward_payload)?;
        Ok(())
    }
}

impl CellDeserialize for JettonTransfer {
    fn load(slice: &mut CellSlice) -> Result<Self, CodecError> {
        expect_magic(slice, Self::MAGIC)?;
        Ok(Self {
            query_id: slice.load_u64()?,
            amount: slice.load_coins()?,
            destination: slice.load_address()?,
            response_destination: slice.load_maybe_address()?,
            custom_payload: slice.load_maybe_ref()?,
            forward_amount: slice.load_coins()?,
            forward_payload: slice.load_either()?,
        })
    }
}

/// Any message this crate produces, dispatched on its magic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DexMessage {
    NativeSwap(NativeSwapRequest),
    JettonSwap(JettonSwapRequest),
    JettonTransfer(JettonTransfer),
}

impl DexMessage {
    pub fn decode(cell: &Cell) -> Result<Self, CodecError> {
        let magic = cell.parse().preload_uint(32)? as u32;
        match magic {
            NativeSwapRequest::MAGIC => Ok(Self::NativeSwap(NativeSwapRequest::from_cell(cell)?)),
            JettonSwapRequest::MAGIC => Ok(Self::JettonSwap(JettonSwapRequest::from_cell(cell)?)),
            JettonTransfer::MAGIC => Ok(Self::JettonTransfer(JettonTransfer::from_cell(cell)?)),
            other => Err(CodecError::UnrecognizedMessage(other)),
        }
    }
}

/// Builds request bodies for both swap directions
pub struct SwapMessageFactory;

impl SwapMessageFactory {
    /// Pseudo-random query id; uniqueness is not guaranteed
    pub fn random_query_id() -> u64 {
        rand::random()
    }

    /// Body for a native → token swap, addressed to the native vault
    pub fn native_swap_request(
        query_id: u64,
        amount: Coins,
        step: SwapStep,
        params: SwapParams,
    ) -> Result<Cell, CodecError> {
        NativeSwapRequest {
            query_id,
            amount,
            step,
            params,
        }
        .to_cell()
    }

    /// Inner swap request embedded in a jetton transfer
    pub fn jetton_swap_request(step: SwapStep, params: SwapParams) -> Result<Cell, CodecError> {
        JettonSwapRequest { step, params }.to_cell()
    }

    /// Jetton transfer to `destination_vault` carrying `inner_swap_request`
    /// as its forward payload
    pub fn jetton_transfer_with_swap(
        query_id: u64,
        amount: Coins,
        destination_vault: Address,
        response_address: Address,
        forward_amount: Coins,
        inner_swap_request: Cell,
    ) -> Result<Cell, CodecError> {
        JettonTransfer {
            query_id,
            amount,
            destination: destination_vault,
            response_destination: Some(response_address),
            custom_payload: None,
            forward_amount,
            forward_payload: inner_swap_request,
        }
        .to_cell()
    }
}
