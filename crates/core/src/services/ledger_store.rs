use chrono::Utc;
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::models::holding::Holding;
use crate::models::portfolio::PortfolioState;
use crate::models::price::PriceUpdate;
use crate::models::transaction::{Transaction, TransactionKind};

/// Relative float tolerance for quantities. Scaled by the held quantity, it
/// bounds how far a sell may exceed the holding and how small a remainder
/// closes the position.
pub const DUST_THRESHOLD: f64 = 1e-12;

/// A purchase of `quantity` units of a coin at `price` per unit.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyOrder {
    pub coin_id: String,
    pub symbol: String,
    pub name: String,
    pub image: String,
    pub quantity: f64,
    pub price: f64,
}

impl BuyOrder {
    pub fn new(
        coin_id: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
        quantity: f64,
        price: f64,
    ) -> Self {
        Self {
            coin_id: coin_id.into(),
            symbol: symbol.into(),
            name: name.into(),
            image: String::new(),
            quantity,
            price,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }
}

/// A disposal of `quantity` units of a held coin at `price` per unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SellOrder {
    pub coin_id: String,
    pub quantity: f64,
    pub price: f64,
}

impl SellOrder {
    pub fn new(coin_id: impl Into<String>, quantity: f64, price: f64) -> Self {
        Self {
            coin_id: coin_id.into(),
            quantity,
            price,
        }
    }
}

/// Every state transition the ledger accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    Buy(BuyOrder),
    Sell(SellOrder),
    UpdatePrices(Vec<PriceUpdate>),
    Clear,
    Load(PortfolioState),
}

/// What a committed command did.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    Bought(Transaction),
    Sold(SellReceipt),
    PricesUpdated { matched: usize },
    Cleared,
    Loaded,
}

/// Result of a committed sell.
#[derive(Debug, Clone, PartialEq)]
pub struct SellReceipt {
    pub transaction: Transaction,
    /// Cost basis released by the sale
    pub cost_basis: f64,
    /// Proceeds minus released cost basis
    pub realized_profit_loss: f64,
    /// True when the sale closed the position
    pub closed: bool,
}

/// The portfolio accounting state machine.
///
/// Pure business logic: no I/O, no clock beyond transaction timestamps.
/// Each command is validated in full before any field is touched, so a
/// rejected command leaves the state exactly as it was.
#[derive(Debug, Clone, Default)]
pub struct LedgerStore {
    state: PortfolioState,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing snapshot as-is.
    pub fn from_state(state: PortfolioState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn into_state(self) -> PortfolioState {
        self.state
    }

    /// Single dispatch point: `state' = apply(state, command)`.
    pub fn apply(&mut self, command: LedgerCommand) -> Result<LedgerEvent, CoreError> {
        match command {
            LedgerCommand::Buy(order) => self.buy(order).map(LedgerEvent::Bought),
            LedgerCommand::Sell(order) => self.sell(order).map(LedgerEvent::Sold),
            LedgerCommand::UpdatePrices(updates) => {
                let matched = self.update_prices(&updates);
                Ok(LedgerEvent::PricesUpdated { matched })
            }
            LedgerCommand::Clear => {
                self.clear();
                Ok(LedgerEvent::Cleared)
            }
            LedgerCommand::Load(state) => {
                self.load(state);
                Ok(LedgerEvent::Loaded)
            }
        }
    }

    /// Record a purchase, blending it into the weighted-average cost basis.
    pub fn buy(&mut self, order: BuyOrder) -> Result<Transaction, CoreError> {
        validate_amounts(&order.coin_id, order.quantity, order.price)?;

        let total_amount = order.quantity * order.price;
        let now = Utc::now();

        let holding = match self.state.holdings.remove(&order.coin_id) {
            Some(mut existing) => {
                existing.quantity += order.quantity;
                existing.total_invested += total_amount;
                existing.average_buy_price = existing.total_invested / existing.quantity;
                existing.last_updated = now;
                existing
            }
            None => Holding {
                coin_id: order.coin_id.clone(),
                symbol: order.symbol,
                name: order.name,
                image: order.image,
                quantity: order.quantity,
                average_buy_price: order.price,
                total_invested: total_amount,
                // Until the first price sync, value the position at cost.
                current_price: order.price,
                current_value: 0.0,
                profit_loss: 0.0,
                profit_loss_percentage: 0.0,
                last_updated: now,
            },
        };

        self.commit_holding(holding);

        let transaction =
            Transaction::new(TransactionKind::Buy, order.coin_id, order.quantity, order.price);
        self.state.transactions.push(transaction.clone());
        self.state.recompute_totals();
        Ok(transaction)
    }

    /// Record a sale. The remaining units keep their average cost.
    ///
    /// Rejected (state untouched, nothing appended) when the coin isn't held
    /// or the order exceeds the held quantity.
    pub fn sell(&mut self, order: SellOrder) -> Result<SellReceipt, CoreError> {
        validate_amounts(&order.coin_id, order.quantity, order.price)?;

        let existing = self
            .state
            .holdings
            .get(&order.coin_id)
            .ok_or_else(|| CoreError::HoldingNotFound(order.coin_id.clone()))?;

        let tolerance = existing.quantity * DUST_THRESHOLD;
        if order.quantity > existing.quantity + tolerance {
            return Err(CoreError::InsufficientHoldings {
                coin_id: order.coin_id.clone(),
                requested: order.quantity,
                held: existing.quantity,
            });
        }

        let sold_fraction = (order.quantity / existing.quantity).min(1.0);
        let sold_invested = sold_fraction * existing.total_invested;
        let remaining_invested = existing.total_invested - sold_invested;
        let remaining_quantity = (existing.quantity - order.quantity).max(0.0);
        let closed = remaining_quantity <= tolerance;

        if closed {
            self.state.holdings.remove(&order.coin_id);
        } else if let Some(holding) = self.state.holdings.get_mut(&order.coin_id) {
            holding.quantity = remaining_quantity;
            holding.total_invested = remaining_invested;
            holding.average_buy_price = remaining_invested / remaining_quantity;
            holding.last_updated = Utc::now();
            holding.revalue();
        }

        let transaction =
            Transaction::new(TransactionKind::Sell, order.coin_id, order.quantity, order.price);
        self.state.transactions.push(transaction.clone());
        self.state.recompute_totals();

        Ok(SellReceipt {
            realized_profit_loss: transaction.total_amount - sold_invested,
            cost_basis: sold_invested,
            closed,
            transaction,
        })
    }

    /// Revalue held coins at fresh market prices. Not a ledger event: no
    /// transaction is appended.
    ///
    /// The first entry per coin wins; entries for coins not held and prices
    /// that are negative or non-finite are ignored. Returns how many holdings
    /// matched an update.
    pub fn update_prices(&mut self, updates: &[PriceUpdate]) -> usize {
        let mut latest: HashMap<&str, f64> = HashMap::with_capacity(updates.len());
        for update in updates {
            if update.current_price.is_finite() && update.current_price >= 0.0 {
                latest.entry(update.coin_id.as_str()).or_insert(update.current_price);
            }
        }

        let now = Utc::now();
        let mut matched = 0;
        for holding in self.state.holdings.values_mut() {
            let Some(&price) = latest.get(holding.coin_id.as_str()) else {
                continue;
            };
            matched += 1;
            // Re-applying an identical price must leave the holding bit-identical.
            if holding.current_price.to_bits() != price.to_bits() {
                holding.current_price = price;
                holding.last_updated = now;
            }
            holding.revalue();
        }

        self.state.recompute_totals();
        matched
    }

    /// Reset to the empty portfolio.
    pub fn clear(&mut self) {
        self.state = PortfolioState::new();
    }

    /// Replace the whole state with a snapshot.
    pub fn load(&mut self, state: PortfolioState) {
        self.state = state;
    }

    fn commit_holding(&mut self, mut holding: Holding) {
        holding.revalue();
        self.state.holdings.insert(holding.coin_id.clone(), holding);
    }
}

/// Rules shared by buys and sells:
/// - coin id must be non-empty
/// - quantity and price must be finite and strictly positive
fn validate_amounts(coin_id: &str, quantity: f64, price: f64) -> Result<(), CoreError> {
    if coin_id.trim().is_empty() {
        return Err(CoreError::Validation("Coin id must not be empty".into()));
    }
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(CoreError::Validation(format!(
            "Quantity must be positive, got {quantity}"
        )));
    }
    if !price.is_finite() || price <= 0.0 {
        return Err(CoreError::Validation(format!(
            "Price must be positive, got {price}"
        )));
    }
    Ok(())
}
