//! Average True Range with Wilder smoothing, the stop-distance heuristic
//! behind the `atr` trailing mode.

use crate::types::Candle;

#[derive(Debug, Clone, Copy)]
pub struct Atr {
    pub period: usize,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    //TR = max(H - L, |H - prev C|, |L - prev C|)
    #[inline]
    fn true_range(candle: &Candle, prev_close: f64) -> f64 {
        let hl = candle.high - candle.low;
        let hc = (candle.high - prev_close).abs();
        let lc = (candle.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Latest ATR over the candle series (oldest first), or None until there
    /// are enough bars for the warm-up average.
    pub fn compute(&self, candles: &[Candle]) -> Option<f64> {
        if self.period == 0 || candles.len() <= self.period {
            return None;
        }

        let tr: Vec<f64> = candles
            .windows(2)
            .map(|pair| Self::true_range(&pair[1], pair[0].close))
            .collect();

        //seed with a plain average, then Wilder: atr = (prev*(n-1) + tr) / n
        let mut atr = tr[..self.period].iter().sum::<f64>() / self.period as f64;
        for value in &tr[self.period..] {
            atr = (atr * (self.period - 1) as f64 + value) / self.period as f64;
        }
        Some(atr)
    }
}

/// ATR expressed in pips of the given size, for reports.
pub fn atr_pips(candles: &[Candle], period: usize, pip: f64) -> Option<f64> {
    Atr::new(period).compute(candles).map(|atr| atr / pip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: 0,
            open,
            high,
            low,
            close,
            tick_volume: 0,
        }
    }

    #[test]
    fn test_true_range_covers_gaps() {
        //plain range
        let tr = Atr::true_range(&candle(100.0, 105.0, 95.0, 102.0), 100.0);
        assert!((tr - 10.0).abs() < 1e-10);
        //gap up: high vs previous close dominates
        let tr = Atr::true_range(&candle(110.0, 115.0, 108.0, 112.0), 100.0);
        assert!((tr - 15.0).abs() < 1e-10);
        //gap down: previous close vs low dominates
        let tr = Atr::true_range(&candle(90.0, 92.0, 85.0, 88.0), 100.0);
        assert!((tr - 15.0).abs() < 1e-10);
    }

    #[test]
    fn test_atr_wilder_smoothing() {
        let candles = vec![
            candle(100.0, 102.0, 98.0, 101.0),
            candle(101.0, 104.0, 99.0, 103.0),  // TR = 5
            candle(103.0, 106.0, 101.0, 105.0), // TR = 5
            candle(105.0, 112.0, 105.0, 110.0), // TR = 7 (gap up)
            candle(110.0, 111.0, 107.0, 108.0), // TR = 4
        ];
        let atr = Atr::new(3).compute(&candles).unwrap();
        //seed (5+5+7)/3 = 5.6666..., then (5.6666*2 + 4)/3 = 5.1111...
        assert!((atr - 5.111111111).abs() < 1e-8);
    }

    #[test]
    fn test_atr_needs_warmup() {
        let candles = vec![
            candle(100.0, 102.0, 98.0, 101.0),
            candle(101.0, 104.0, 99.0, 103.0),
        ];
        assert!(Atr::new(5).compute(&candles).is_none());
        assert!(Atr::new(0).compute(&candles).is_none());
    }

    #[test]
    fn test_atr_pips() {
        let candles = vec![
            candle(1.1000, 1.1010, 1.0990, 1.1005),
            candle(1.1005, 1.1015, 1.0995, 1.1010), // TR = 0.0020
            candle(1.1010, 1.1020, 1.1000, 1.1015), // TR = 0.0020
        ];
        let pips = atr_pips(&candles, 2, 0.0001).unwrap();
        assert!((pips - 20.0).abs() < 1e-6);
    }
}
