//! Kraken v2 book checksum.
//!
//! For the top 10 asks (lowest first) followed by the top 10 bids (highest
//! first), each price and quantity is rendered at its wire scale, the decimal
//! point removed and leading zeros stripped. The concatenation of all those
//! strings is hashed with CRC32.
//!
//! Wire scale is whatever the frame carried (`45281.0` stays `45281.0`). When
//! the instrument's [`Precision`] is known, levels are rescaled to it first so
//! a number sent without trailing zeros still hashes correctly.

use rust_decimal::Decimal;

use super::side::PriceLevel;

/// Levels per side that contribute to the checksum.
pub const CHECKSUM_DEPTH: usize = 10;

/// Decimal places of an instrument's prices and quantities.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Precision {
    pub price: u32,
    pub qty: u32,
}

/// CRC32 over the given best-first ask and bid levels.
pub fn checksum(asks: &[PriceLevel], bids: &[PriceLevel]) -> u32 {
    checksum_with(asks, bids, None)
}

/// [`checksum`], rescaling every level to `precision` first if given.
pub fn checksum_with(asks: &[PriceLevel], bids: &[PriceLevel], precision: Option<Precision>) -> u32 {
    crc32fast::hash(checksum_input_with(asks, bids, precision).as_bytes())
}

/// The string that [`checksum`] hashes.
pub fn checksum_input(asks: &[PriceLevel], bids: &[PriceLevel]) -> String {
    checksum_input_with(asks, bids, None)
}

fn checksum_input_with(asks: &[PriceLevel], bids: &[PriceLevel], precision: Option<Precision>) -> String {
    let mut buf = String::with_capacity(CHECKSUM_DEPTH * 2 * 16);
    for level in asks.iter().take(CHECKSUM_DEPTH) {
        push_level(&mut buf, level, precision);
    }
    for level in bids.iter().take(CHECKSUM_DEPTH) {
        push_level(&mut buf, level, precision);
    }
    buf
}

fn push_level(buf: &mut String, level: &PriceLevel, precision: Option<Precision>) {
    let (mut price, mut qty) = (level.price, level.quantity);
    if let Some(p) = precision {
        price.rescale(p.price);
        qty.rescale(p.qty);
    }
    push_digits(buf, price);
    push_digits(buf, qty);
}

fn push_digits(buf: &mut String, value: Decimal) {
    let rendered = value.to_string();
    let digits = rendered
        .chars()
        .filter(|c| *c != '.')
        .skip_while(|c| *c == '0');
    buf.extend(digits);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn strips_points_and_leading_zeros() {
        let asks = [PriceLevel::new(dec!(0.05005), dec!(0.00000500))];
        let bids = [PriceLevel::new(dec!(0.05000), dec!(0.00001000))];
        assert_eq!(checksum_input(&asks, &bids), "500550050001000");
    }

    #[test]
    fn asks_come_before_bids() {
        let asks = [PriceLevel::new(dec!(101), dec!(3))];
        let bids = [PriceLevel::new(dec!(100), dec!(2))];
        assert_eq!(checksum_input(&asks, &bids), "10131002");
    }

    #[test]
    fn only_top_ten_levels_count() {
        let asks: Vec<_> = (1..=12)
            .map(|i| PriceLevel::new(Decimal::from(i), dec!(1)))
            .collect();
        let input = checksum_input(&asks, &[]);
        assert_eq!(input, "112131415161718191101");
    }

    /// BTC/USD book from Kraken's v2 checksum guide, best first.
    fn kraken_btc_usd() -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        let asks = [
            (dec!(45285.2), dec!(0.00100000)),
            (dec!(45286.4), dec!(1.54571953)),
            (dec!(45286.6), dec!(1.54571109)),
            (dec!(45289.6), dec!(1.54560911)),
            (dec!(45290.2), dec!(0.15890660)),
            (dec!(45291.8), dec!(1.54553491)),
            (dec!(45294.7), dec!(0.04454749)),
            (dec!(45296.1), dec!(0.35380000)),
            (dec!(45297.5), dec!(0.09945542)),
            (dec!(45299.5), dec!(0.18772827)),
        ];
        let bids = [
            (dec!(45283.5), dec!(0.10000000)),
            (dec!(45283.4), dec!(1.54582015)),
            (dec!(45282.1), dec!(0.10000000)),
            (dec!(45281.0), dec!(0.10000000)),
            (dec!(45280.3), dec!(1.54592586)),
            (dec!(45279.0), dec!(0.07990000)),
            (dec!(45277.6), dec!(0.03310103)),
            (dec!(45277.5), dec!(0.30000000)),
            (dec!(45277.3), dec!(1.54602737)),
            (dec!(45276.6), dec!(0.15445238)),
        ];
        let levels = |side: &[_]| side.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect();
        (levels(&asks[..]), levels(&bids[..]))
    }

    #[test]
    fn matches_published_kraken_checksum() {
        let (asks, bids) = kraken_btc_usd();
        assert!(checksum_input(&asks, &bids).starts_with("452852100000452864154571953"));
        assert_eq!(checksum(&asks, &bids), 3310070434);
    }

    #[test]
    fn precision_restores_dropped_trailing_zeros() {
        let (asks, bids) = kraken_btc_usd();
        let strip = |side: &[PriceLevel]| -> Vec<PriceLevel> {
            side.iter()
                .map(|l| PriceLevel::new(l.price.normalize(), l.quantity.normalize()))
                .collect()
        };
        let (asks, bids) = (strip(&asks), strip(&bids));
        assert_ne!(checksum(&asks, &bids), 3310070434);

        let precision = Precision { price: 1, qty: 8 };
        assert_eq!(checksum_with(&asks, &bids, Some(precision)), 3310070434);
    }

    #[test]
    fn hashes_the_input_with_crc32() {
        let asks = [PriceLevel::new(dec!(2000.10), dec!(1.5))];
        let bids = [PriceLevel::new(dec!(1999.90), dec!(0.25))];
        let expected = crc32fast::hash(checksum_input(&asks, &bids).as_bytes());
        assert_eq!(checksum(&asks, &bids), expected);
        assert_eq!(checksum_input(&asks, &bids), "2000101519999025");
    }
}
