use crate::{
    Error, Result,
    encoding::base32::{self, Alphabet},
};

/// Separator between the price rank and the campaign id in a queue key.
pub const RANK_SEPARATOR: char = '%';

/// Encodes `price` so that higher prices sort first.
///
/// The prefix is the 7-character Crockford form of `u32::MAX - price`.
///
/// # Errors
///
/// Returns [`Error::PriceOutOfRange`] when `price` does not fit in 32 bits.
///
/// # Example
/// ```
/// use beacon::campaign::price_rank_prefix;
///
/// let cheap = price_rank_prefix(10).unwrap();
/// let pricey = price_rank_prefix(5_000).unwrap();
/// assert!(pricey < cheap);
/// ```
pub fn price_rank_prefix(price: u64) -> Result<String> {
    let price = u32::try_from(price).map_err(|_| Error::PriceOutOfRange { price })?;
    Ok(base32::encode_u32(&Alphabet::CROCKFORD, u32::MAX - price))
}

/// Key of a campaign entry in a recipient's queue: `<rank>%<campaign id>`.
pub fn queue_key(rank_prefix: &str, campaign_id: &str) -> String {
    format!("{rank_prefix}{RANK_SEPARATOR}{campaign_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_price_sorts_first() {
        let prices = [0_u64, 1, 99, 100, 101, 20_000, u64::from(u32::MAX)];
        let prefixes: Vec<String> = prices
            .iter()
            .map(|&p| price_rank_prefix(p).unwrap())
            .collect();
        for pair in prefixes.windows(2) {
            assert!(pair[0] > pair[1], "{pair:?}");
        }
        assert_eq!(price_rank_prefix(u64::from(u32::MAX)).unwrap(), "0000000");
        assert_eq!(price_rank_prefix(0).unwrap(), "3ZZZZZZ");
    }

    #[test]
    fn rejects_prices_beyond_32_bits() {
        let price = u64::from(u32::MAX) + 1;
        assert_eq!(
            price_rank_prefix(price),
            Err(Error::PriceOutOfRange { price })
        );
    }

    #[test]
    fn queue_keys_order_by_price_then_id() {
        let a = queue_key(&price_rank_prefix(500).unwrap(), "x-asia-0");
        let b = queue_key(&price_rank_prefix(400).unwrap(), "a-asia-0");
        assert!(a < b);
        assert!(a.starts_with(&price_rank_prefix(500).unwrap()));
    }
}
