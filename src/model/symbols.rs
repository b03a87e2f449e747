//! Filesystem-safe symbol normalization, grounded on `mm_core/symbols.py`.

/// Strip separators so a symbol is safe to use as a path component.
pub fn symbol_fs(symbol: &str, upper: bool) -> String {
    let cleaned: String = symbol.chars().filter(|c| !matches!(c, '/' | '-' | ':' | ' ')).collect();
    if upper {
        cleaned.to_uppercase()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_separators() {
        assert_eq!(symbol_fs("BTC/USDT", false), "BTCUSDT");
        assert_eq!(symbol_fs("btc-usd", true), "BTCUSD");
        assert_eq!(symbol_fs("XBT:USD test", false), "XBTUSDtest");
    }
}
