//! Packed option identifier codec.
//!
//! A single 256-bit integer carries the full identity of a (possibly
//! multi-leg) option. Layout, LSB = bit 0:
//!
//! | bits      | field                          |
//! |-----------|--------------------------------|
//! | 240..256  | underlying asset index (16)    |
//! | 200..240  | expiry, unix seconds (40)      |
//! | 196..200  | strategy code (4)              |
//! | 194..196  | leg count - 1 (2)              |
//! | 2..194    | four 48-bit legs               |
//! | 0..2      | source vault index (2)         |
//!
//! Leg `i` packs `isBuy` at `193 - 48i`, the strike at `147 - 48i` (46 bits)
//! and `isCall` at `146 - 48i`.

use alloy::primitives::U256;
use thiserror::Error;

pub const MAX_LEGS: usize = 4;

const ASSET_OFFSET: usize = 240;
const EXPIRY_OFFSET: usize = 200;
const STRATEGY_OFFSET: usize = 196;
const LENGTH_OFFSET: usize = 194;
const LEG_WIDTH: usize = 48;
const LEG_IS_BUY_OFFSET: usize = 193;
const LEG_STRIKE_OFFSET: usize = 147;
const LEG_IS_CALL_OFFSET: usize = 146;

const EXPIRY_BITS: u32 = 40;
const STRIKE_BITS: u32 = 46;
const VAULT_INDEX_BITS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OptionIdError {
    #[error("leg pattern does not match any supported strategy")]
    InvalidStrategy,
    #[error("declared length {declared} but {actual} legs carry a strike")]
    LengthMismatch { declared: u8, actual: u8 },
    #[error("{field} does not fit in {bits} bits")]
    FieldOverflow { field: &'static str, bits: u32 },
}

/// Option strategy. The discriminant is the 4-bit code stored in the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Strategy {
    NotSupported = 0,
    BuyCall = 1,
    SellCall = 2,
    BuyPut = 3,
    SellPut = 4,
    BuyCallSpread = 5,
    SellCallSpread = 6,
    BuyPutSpread = 7,
    SellPutSpread = 8,
}

impl Strategy {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::BuyCall,
            2 => Self::SellCall,
            3 => Self::BuyPut,
            4 => Self::SellPut,
            5 => Self::BuyCallSpread,
            6 => Self::SellCallSpread,
            7 => Self::BuyPutSpread,
            8 => Self::SellPutSpread,
            _ => Self::NotSupported,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_buy(self) -> bool {
        matches!(
            self,
            Self::BuyCall | Self::BuyPut | Self::BuyCallSpread | Self::BuyPutSpread
        )
    }

    pub fn is_call(self) -> bool {
        matches!(
            self,
            Self::BuyCall | Self::SellCall | Self::BuyCallSpread | Self::SellCallSpread
        )
    }

    pub fn is_spread(self) -> bool {
        matches!(
            self,
            Self::BuyCallSpread | Self::SellCallSpread | Self::BuyPutSpread | Self::SellPutSpread
        )
    }

    pub fn is_put_spread(self) -> bool {
        matches!(self, Self::BuyPutSpread | Self::SellPutSpread)
    }
}

/// One leg of an option. A strike of `0` means "no leg".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Leg {
    pub is_buy: bool,
    pub strike_price: u64,
    pub is_call: bool,
}

impl Leg {
    pub fn new(is_buy: bool, strike_price: u64, is_call: bool) -> Self {
        Self {
            is_buy,
            strike_price,
            is_call,
        }
    }
}

/// Decoded option identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionId {
    pub underlying_asset_index: u16,
    pub expiry: u64,
    pub strategy: Strategy,
    pub length: u8,
    pub legs: [Leg; MAX_LEGS],
    pub source_vault_index: u8,
}

impl OptionId {
    /// Legs that carry a strike, in canonical order.
    pub fn active_legs(&self) -> &[Leg] {
        &self.legs[..(self.length as usize).min(MAX_LEGS)]
    }

    /// Strike used for settlement payoff: the second leg of a put spread,
    /// the first leg otherwise.
    pub fn main_strike(&self) -> u64 {
        if self.strategy.is_put_spread() {
            self.legs[1].strike_price
        } else {
            self.legs[0].strike_price
        }
    }

    pub fn encode(&self) -> Result<U256, OptionIdError> {
        encode_option_id(
            self.underlying_asset_index,
            self.expiry,
            self.length,
            &self.legs,
            self.source_vault_index,
        )
    }
}

/// Sort legs ascending by strike with empty legs last, then classify them.
///
/// Returns the canonical legs alongside the strategy so callers pack exactly
/// what was classified.
pub fn determine_strategy(
    length: u8,
    legs: &[Leg],
) -> Result<(Strategy, [Leg; MAX_LEGS]), OptionIdError> {
    if legs.len() > MAX_LEGS {
        return Err(OptionIdError::LengthMismatch {
            declared: length,
            actual: legs.iter().filter(|l| l.strike_price != 0).count() as u8,
        });
    }

    let mut sorted = [Leg::default(); MAX_LEGS];
    sorted[..legs.len()].copy_from_slice(legs);

    // Stable bubble sort: a zero strike never moves ahead of a real one.
    for i in 0..MAX_LEGS - 1 {
        for j in 0..MAX_LEGS - 1 - i {
            let a = sorted[j].strike_price;
            let b = sorted[j + 1].strike_price;
            if (a > b && b != 0) || (a == 0 && b != 0) {
                sorted.swap(j, j + 1);
            }
        }
    }

    let actual = sorted.iter().filter(|l| l.strike_price != 0).count() as u8;
    if actual != length {
        return Err(OptionIdError::LengthMismatch {
            declared: length,
            actual,
        });
    }

    for leg in sorted.iter_mut().skip(actual as usize) {
        *leg = Leg::default();
    }

    let strategy = match (length, &sorted[..]) {
        (1, [l0, ..]) => match (l0.is_buy, l0.is_call) {
            (true, true) => Strategy::BuyCall,
            (false, true) => Strategy::SellCall,
            (true, false) => Strategy::BuyPut,
            (false, false) => Strategy::SellPut,
        },
        (2, [l0, l1, ..]) => match (l0.is_buy, l0.is_call, l1.is_buy, l1.is_call) {
            (true, true, false, true) => Strategy::BuyCallSpread,
            (false, true, true, true) => Strategy::SellCallSpread,
            (false, false, true, false) => Strategy::BuyPutSpread,
            (true, false, false, false) => Strategy::SellPutSpread,
            _ => return Err(OptionIdError::InvalidStrategy),
        },
        _ => return Err(OptionIdError::InvalidStrategy),
    };

    Ok((strategy, sorted))
}

pub fn encode_option_id(
    underlying_asset_index: u16,
    expiry: u64,
    length: u8,
    legs: &[Leg],
    source_vault_index: u8,
) -> Result<U256, OptionIdError> {
    check_width("expiry", expiry, EXPIRY_BITS)?;
    check_width("source vault index", source_vault_index as u64, VAULT_INDEX_BITS)?;
    for leg in legs {
        check_width("strike price", leg.strike_price, STRIKE_BITS)?;
    }

    let (strategy, legs) = determine_strategy(length, legs)?;

    let mut id = (U256::from(underlying_asset_index) << ASSET_OFFSET)
        | (U256::from(expiry) << EXPIRY_OFFSET)
        | (U256::from(strategy.code()) << STRATEGY_OFFSET)
        | (U256::from(length - 1) << LENGTH_OFFSET);

    for (i, leg) in legs.iter().enumerate() {
        let shift = LEG_WIDTH * i;
        id |= U256::from(leg.is_buy as u8) << (LEG_IS_BUY_OFFSET - shift);
        id |= U256::from(leg.strike_price) << (LEG_STRIKE_OFFSET - shift);
        id |= U256::from(leg.is_call as u8) << (LEG_IS_CALL_OFFSET - shift);
    }

    id |= U256::from(source_vault_index);

    Ok(id)
}

pub fn decode_option_id(id: U256) -> Result<OptionId, OptionIdError> {
    let strategy = Strategy::from_code(field(id, STRATEGY_OFFSET, 4) as u8);
    if strategy == Strategy::NotSupported {
        return Err(OptionIdError::InvalidStrategy);
    }

    let mut legs = [Leg::default(); MAX_LEGS];
    for (i, leg) in legs.iter_mut().enumerate() {
        let shift = LEG_WIDTH * i;
        *leg = Leg {
            is_buy: id.bit(LEG_IS_BUY_OFFSET - shift),
            strike_price: field(id, LEG_STRIKE_OFFSET - shift, STRIKE_BITS as usize),
            is_call: id.bit(LEG_IS_CALL_OFFSET - shift),
        };
    }

    Ok(OptionId {
        underlying_asset_index: field(id, ASSET_OFFSET, 16) as u16,
        expiry: field(id, EXPIRY_OFFSET, EXPIRY_BITS as usize),
        strategy,
        length: field(id, LENGTH_OFFSET, 2) as u8 + 1,
        legs,
        source_vault_index: field(id, 0, VAULT_INDEX_BITS as usize) as u8,
    })
}

fn field(id: U256, offset: usize, bits: usize) -> u64 {
    let mask = (U256::from(1u64) << bits) - U256::from(1u64);
    ((id >> offset) & mask).to::<u64>()
}

fn check_width(field: &'static str, value: u64, bits: u32) -> Result<(), OptionIdError> {
    if value >> bits != 0 {
        return Err(OptionIdError::FieldOverflow { field, bits });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPIRY: u64 = 1_709_884_800;

    fn round_trip(legs: &[Leg], expected: Strategy) {
        let length = legs.len() as u8;
        let id = encode_option_id(1, EXPIRY, length, legs, 2).unwrap();
        let decoded = decode_option_id(id).unwrap();

        assert_eq!(decoded.strategy, expected);
        assert_eq!(decoded.underlying_asset_index, 1);
        assert_eq!(decoded.expiry, EXPIRY);
        assert_eq!(decoded.length, length);
        assert_eq!(decoded.source_vault_index, 2);
        assert_eq!(decoded.active_legs(), legs);
        assert_eq!(decoded.encode().unwrap(), id);
    }

    #[test]
    fn test_round_trip_single_legs() {
        round_trip(&[Leg::new(true, 60_000, true)], Strategy::BuyCall);
        round_trip(&[Leg::new(false, 60_000, true)], Strategy::SellCall);
        round_trip(&[Leg::new(true, 3_200, false)], Strategy::BuyPut);
        round_trip(&[Leg::new(false, 3_200, false)], Strategy::SellPut);
    }

    #[test]
    fn test_round_trip_spreads() {
        round_trip(
            &[Leg::new(true, 60_000, true), Leg::new(false, 62_000, true)],
            Strategy::BuyCallSpread,
        );
        round_trip(
            &[Leg::new(false, 60_000, true), Leg::new(true, 62_000, true)],
            Strategy::SellCallSpread,
        );
        round_trip(
            &[Leg::new(false, 3_000, false), Leg::new(true, 3_200, false)],
            Strategy::BuyPutSpread,
        );
        round_trip(
            &[Leg::new(true, 3_000, false), Leg::new(false, 3_200, false)],
            Strategy::SellPutSpread,
        );
    }

    #[test]
    fn test_legs_are_sorted_with_flags() {
        // Higher strike first: the sort must carry isBuy along with the strike.
        let legs = [Leg::new(false, 62_000, true), Leg::new(true, 60_000, true)];
        let id = encode_option_id(1, EXPIRY, 2, &legs, 0).unwrap();
        let decoded = decode_option_id(id).unwrap();

        assert_eq!(decoded.strategy, Strategy::BuyCallSpread);
        assert_eq!(decoded.legs[0], Leg::new(true, 60_000, true));
        assert_eq!(decoded.legs[1], Leg::new(false, 62_000, true));
    }

    #[test]
    fn test_empty_legs_sort_last() {
        let legs = [
            Leg::default(),
            Leg::new(true, 60_000, true),
            Leg::default(),
            Leg::default(),
        ];
        let (strategy, sorted) = determine_strategy(1, &legs).unwrap();
        assert_eq!(strategy, Strategy::BuyCall);
        assert_eq!(sorted[0].strike_price, 60_000);
        assert_eq!(sorted[1], Leg::default());
    }

    #[test]
    fn test_bit_layout() {
        let id = encode_option_id(1, EXPIRY, 1, &[Leg::new(true, 60_000, true)], 3).unwrap();

        assert_eq!(id >> 240usize, U256::from(1u64));
        assert_eq!(field(id, 196, 4), Strategy::BuyCall.code() as u64);
        assert_eq!(field(id, 194, 2), 0);
        assert!(id.bit(193));
        assert_eq!(field(id, 147, 46), 60_000);
        assert!(id.bit(146));
        assert_eq!(field(id, 0, 2), 3);
    }

    #[test]
    fn test_length_mismatch() {
        let err = encode_option_id(1, EXPIRY, 2, &[Leg::new(true, 60_000, true)], 0).unwrap_err();
        assert_eq!(
            err,
            OptionIdError::LengthMismatch {
                declared: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_invalid_strategy() {
        // Two bought calls is not a spread.
        let legs = [Leg::new(true, 60_000, true), Leg::new(true, 62_000, true)];
        assert_eq!(
            encode_option_id(1, EXPIRY, 2, &legs, 0).unwrap_err(),
            OptionIdError::InvalidStrategy
        );

        // Mixed call/put legs.
        let legs = [Leg::new(true, 60_000, true), Leg::new(false, 62_000, false)];
        assert_eq!(
            encode_option_id(1, EXPIRY, 2, &legs, 0).unwrap_err(),
            OptionIdError::InvalidStrategy
        );

        // Three legs never classify.
        let legs = [
            Leg::new(true, 1, true),
            Leg::new(false, 2, true),
            Leg::new(true, 3, true),
        ];
        assert_eq!(
            encode_option_id(1, EXPIRY, 3, &legs, 0).unwrap_err(),
            OptionIdError::InvalidStrategy
        );
    }

    #[test]
    fn test_decode_rejects_unsupported_codes() {
        assert_eq!(
            decode_option_id(U256::ZERO).unwrap_err(),
            OptionIdError::InvalidStrategy
        );
        let id = U256::from(9u64) << STRATEGY_OFFSET;
        assert_eq!(decode_option_id(id).unwrap_err(), OptionIdError::InvalidStrategy);
    }

    #[test]
    fn test_field_overflow() {
        let err = encode_option_id(1, 1u64 << 40, 1, &[Leg::new(true, 1, true)], 0).unwrap_err();
        assert_eq!(
            err,
            OptionIdError::FieldOverflow {
                field: "expiry",
                bits: 40
            }
        );

        let err =
            encode_option_id(1, EXPIRY, 1, &[Leg::new(true, 1u64 << 46, true)], 0).unwrap_err();
        assert!(matches!(err, OptionIdError::FieldOverflow { bits: 46, .. }));

        let err = encode_option_id(1, EXPIRY, 1, &[Leg::new(true, 1, true)], 4).unwrap_err();
        assert!(matches!(err, OptionIdError::FieldOverflow { bits: 2, .. }));
    }

    #[test]
    fn test_main_strike() {
        let put_spread = [Leg::new(false, 3_000, false), Leg::new(true, 3_200, false)];
        let id = encode_option_id(2, EXPIRY, 2, &put_spread, 0).unwrap();
        assert_eq!(decode_option_id(id).unwrap().main_strike(), 3_200);

        let call_spread = [Leg::new(true, 60_000, true), Leg::new(false, 62_000, true)];
        let id = encode_option_id(1, EXPIRY, 2, &call_spread, 0).unwrap();
        assert_eq!(decode_option_id(id).unwrap().main_strike(), 60_000);
    }
}
