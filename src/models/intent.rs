use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::models::{Asset, Wallet};
use crate::utils::{from_base_units, to_base_units};

/// Default slippage tolerance for swaps
pub const DEFAULT_SLIPPAGE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Default offset added to the chain timestamp for swap deadlines
pub const DEFAULT_DEADLINE_OFFSET_SECS: u64 = 600;

/// What a transaction intent asks the chain to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    NativeTransfer,
    TokenTransfer,
    SwapNativeForToken,
    SwapTokenForNative,
    Approval,
}

/// A validated, immutable request to move or swap value.
///
/// The amount is converted to smallest units exactly once, at construction,
/// and every later stage works on that integer.
#[derive(Debug, Clone)]
pub struct TransactionIntent {
    kind: IntentKind,
    amount: Decimal,
    amount_units: U256,
    asset: Asset,
    sender: Wallet,
    target: Address,
    path: Vec<Address>,
    slippage: Decimal,
    deadline_offset_secs: u64,
}

impl TransactionIntent {
    fn new(
        kind: IntentKind,
        sender: Wallet,
        asset: Asset,
        target: Address,
        amount: Decimal,
        decimals: u8,
    ) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(Error::UserInput(
                "Amount must be greater than zero".to_string(),
            ));
        }
        let amount_units = to_base_units(amount, decimals)?;
        if amount_units.is_zero() {
            return Err(Error::UserInput(format!(
                "Amount {} is smaller than the smallest unit of {}",
                amount,
                asset.display_symbol()
            )));
        }
        Ok(Self {
            kind,
            amount,
            amount_units,
            asset,
            sender,
            target,
            path: Vec::new(),
            slippage: DEFAULT_SLIPPAGE,
            deadline_offset_secs: DEFAULT_DEADLINE_OFFSET_SECS,
        })
    }

    /// Send native coin to `recipient`
    pub fn native_transfer(
        sender: Wallet,
        native: Asset,
        recipient: Address,
        amount: Decimal,
    ) -> Result<Self> {
        if !native.is_native() {
            return Err(Error::UserInput(format!(
                "{} is not the native coin",
                native.display_symbol()
            )));
        }
        let decimals = native.decimals();
        Self::new(IntentKind::NativeTransfer, sender, native, recipient, amount, decimals)
    }

    /// Send an ERC-20 token to `recipient`
    pub fn token_transfer(
        sender: Wallet,
        token: Asset,
        recipient: Address,
        amount: Decimal,
    ) -> Result<Self> {
        if token.is_native() {
            return Err(Error::UserInput(format!(
                "{} is not an ERC-20 token",
                token.display_symbol()
            )));
        }
        let decimals = token.decimals();
        Self::new(IntentKind::TokenTransfer, sender, token, recipient, amount, decimals)
    }

    /// Transfer of either kind, chosen by the asset
    pub fn transfer(sender: Wallet, asset: Asset, recipient: Address, amount: Decimal) -> Result<Self> {
        if asset.is_native() {
            Self::native_transfer(sender, asset, recipient, amount)
        } else {
            Self::token_transfer(sender, asset, recipient, amount)
        }
    }

    /// Spend `native_amount` of native coin on `token` through `router`
    pub fn swap_native_for_token(
        sender: Wallet,
        native: &Asset,
        token: Asset,
        router: Address,
        native_amount: Decimal,
    ) -> Result<Self> {
        if token.is_native() || !native.is_native() {
            return Err(Error::UserInput(
                "A buy needs the native coin as input and a token as output".to_string(),
            ));
        }
        let path = vec![native.path_address(), token.path_address()];
        let mut intent = Self::new(
            IntentKind::SwapNativeForToken,
            sender,
            token,
            router,
            native_amount,
            native.decimals(),
        )?;
        intent.path = path;
        Ok(intent)
    }

    /// Sell `token_amount` of `token` for native coin through `router`
    pub fn swap_token_for_native(
        sender: Wallet,
        token: Asset,
        native: &Asset,
        router: Address,
        token_amount: Decimal,
    ) -> Result<Self> {
        if token.is_native() || !native.is_native() {
            return Err(Error::UserInput(
                "A sell needs a token as input and the native coin as output".to_string(),
            ));
        }
        let path = vec![token.path_address(), native.path_address()];
        let decimals = token.decimals();
        let mut intent = Self::new(
            IntentKind::SwapTokenForNative,
            sender,
            token,
            router,
            token_amount,
            decimals,
        )?;
        intent.path = path;
        Ok(intent)
    }

    /// Allow `spender` to move `amount_units` of `token` on the sender's behalf
    pub fn approval(sender: Wallet, token: Asset, spender: Address, amount_units: U256) -> Result<Self> {
        if token.is_native() || amount_units.is_zero() {
            return Err(Error::UserInput(
                "An approval needs a token and a non-zero amount".to_string(),
            ));
        }
        Ok(Self {
            kind: IntentKind::Approval,
            amount: from_base_units(amount_units, token.decimals()),
            amount_units,
            asset: token,
            sender,
            target: spender,
            path: Vec::new(),
            slippage: DEFAULT_SLIPPAGE,
            deadline_offset_secs: DEFAULT_DEADLINE_OFFSET_SECS,
        })
    }

    /// Override the slippage tolerance, which must lie in `[0, 1)`
    pub fn with_slippage(mut self, slippage: Decimal) -> Result<Self> {
        if slippage.is_sign_negative() || slippage >= Decimal::ONE {
            return Err(Error::UserInput(format!(
                "Slippage tolerance {} is out of range",
                slippage
            )));
        }
        self.slippage = slippage;
        Ok(self)
    }

    pub fn with_deadline_offset(mut self, secs: u64) -> Self {
        self.deadline_offset_secs = secs;
        self
    }

    pub fn kind(&self) -> IntentKind {
        self.kind
    }

    /// Amount as entered, in display units of the input asset
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Amount in smallest units of the input asset
    pub fn amount_units(&self) -> U256 {
        self.amount_units
    }

    /// The token being transferred, bought or sold
    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn sender(&self) -> &Wallet {
        &self.sender
    }

    /// Recipient for transfers, router for swaps, spender for approvals
    pub fn target(&self) -> Address {
        self.target
    }

    /// Router path for swaps, empty otherwise
    pub fn path(&self) -> &[Address] {
        &self.path
    }

    pub fn slippage(&self) -> Decimal {
        self.slippage
    }

    pub fn deadline_offset_secs(&self) -> u64 {
        self.deadline_offset_secs
    }
}
