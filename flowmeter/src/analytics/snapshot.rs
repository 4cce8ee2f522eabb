use crate::{
    exchange::ExchangeId,
    store::SideFilter,
    trade::Market,
};
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Flow differential at or below which selling is dominant.
pub const FLOW_DIFFERENTIAL_BOUNDARY: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

/// Decimal places of prices, notional amounts & rates.
pub const PRICE_DP: u32 = 8;

/// Decimal places of percentage deltas & the flow differential.
pub const PERCENT_DP: u32 = 4;

/// One value per trade side selection.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Constructor, Deserialize, Serialize)]
pub struct SideValues<T> {
    pub all: T,
    pub buy: T,
    pub sell: T,
}

impl<T> SideValues<T> {
    pub fn get(&self, side: SideFilter) -> &T {
        match side {
            SideFilter::All => &self.all,
            SideFilter::Buy => &self.buy,
            SideFilter::Sell => &self.sell,
        }
    }

    /// Build a [`SideValues`] by evaluating `f` for every [`SideFilter`].
    pub fn from_fn<F>(mut f: F) -> Self
    where
        F: FnMut(SideFilter) -> T,
    {
        Self {
            all: f(SideFilter::All),
            buy: f(SideFilter::Buy),
            sell: f(SideFilter::Sell),
        }
    }
}

/// Flow metrics of one window, or their deltas between windows.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
pub struct Metrics<T> {
    /// Sum of traded quantity.
    pub volume: SideValues<T>,
    /// Mean trade price.
    pub price: SideValues<T>,
    /// Mean trade notional.
    pub amount: SideValues<T>,
    /// Number of trades.
    pub count: SideValues<T>,
    /// `volume` per second of window length.
    pub rate_volume: SideValues<T>,
    /// `amount` per second of window length.
    pub rate_amount: SideValues<T>,
    /// `count` per second of window length.
    pub rate_count: SideValues<T>,
}

/// Change of one metric from the last window to the current window.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Constructor, Deserialize, Serialize)]
pub struct Delta {
    /// `current - last`.
    pub absolute: Decimal,
    /// `absolute / last` as a ratio, `None` when `last` is zero.
    pub percent: Option<Decimal>,
}

impl Delta {
    pub fn between(current: Decimal, last: Decimal) -> Self {
        let absolute = current - last;
        let percent = absolute
            .checked_div(last)
            .map(|ratio| ratio.round_dp(PERCENT_DP));

        Self { absolute, percent }
    }
}

/// Dominant side implied by a flow differential.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FlowBias {
    #[display("buy_dominant")]
    BuyDominant,
    #[display("sell_dominant")]
    SellDominant,
}

impl FlowBias {
    /// At or below [`FLOW_DIFFERENTIAL_BOUNDARY`] is sell dominant.
    pub fn from_differential(differential: Decimal) -> Self {
        if differential <= FLOW_DIFFERENTIAL_BOUNDARY {
            FlowBias::SellDominant
        } else {
            FlowBias::BuyDominant
        }
    }
}

/// `buy_rate / (buy_rate + sell_rate) * 100`, or `None` when both rates are zero.
pub fn flow_differential(buy_rate: Decimal, sell_rate: Decimal) -> Option<Decimal> {
    let total = buy_rate.checked_add(sell_rate)?;
    if total.is_zero() {
        return None;
    }

    buy_rate
        .checked_div(total)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|differential| differential.round_dp(PERCENT_DP).normalize())
}

/// Immutable result of one analytics tick for a market & interval.
///
/// A side whose current and last windows are both empty is unavailable and carries
/// `None` in every metric.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct AnalysisSnapshot {
    pub exchange: ExchangeId,
    pub market: SmolStr,
    /// Interval label as entered, eg/ "1 hour".
    pub interval: String,
    pub time: DateTime<Utc>,
    pub current: Metrics<Option<Decimal>>,
    pub last: Metrics<Option<Decimal>>,
    pub difference: Metrics<Option<Delta>>,
    /// 0 to 100 score of buy vs sell volume rate dominance in the current window.
    pub flow_differential: Option<Decimal>,
}

impl AnalysisSnapshot {
    pub fn market(&self) -> Market {
        Market::new(self.exchange, &self.market)
    }

    pub fn flow_bias(&self) -> Option<FlowBias> {
        self.flow_differential.map(FlowBias::from_differential)
    }

    /// Whether the side had any trades in either window.
    pub fn is_available(&self, side: SideFilter) -> bool {
        self.current.count.get(side).is_some()
    }
}
