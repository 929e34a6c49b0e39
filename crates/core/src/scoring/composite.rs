use crate::domain::stock::{round_to, ScoredRecord, StockRecord};
use crate::scoring::normalize::{MinMax, NEUTRAL_SCORE};
use std::cmp::Ordering;

pub const WEIGHT_RANGE: f64 = 0.50;
pub const WEIGHT_SHORT: f64 = 0.30;
pub const WEIGHT_PE: f64 = 0.20;

// P/E outside (0, 100) is kept in the universe but scored neutrally.
const PE_BAND_MAX: f64 = 100.0;

/// Score and rank a universe. Best opportunity first, rank 1.
///
/// Records without a P/E or a 52-week range position are dropped silently. Every other
/// record appears exactly once in the output, with ranks 1..=N and ties kept in input order.
pub fn score(records: &[StockRecord]) -> Vec<ScoredRecord> {
    let eligible: Vec<&StockRecord> = records.iter().filter(|r| is_eligible(r)).collect();

    tracing::info!(
        input = records.len(),
        eligible = eligible.len(),
        "scoring universe"
    );

    let range = MinMax::from_values(eligible.iter().filter_map(|r| r.range_position_pct));
    let short = MinMax::from_values(eligible.iter().filter_map(|r| r.short_absolute_change));
    let pe = MinMax::from_values(
        eligible
            .iter()
            .filter_map(|r| r.pe_ratio)
            .filter(|v| is_valid_pe(*v)),
    );

    let mut scored: Vec<ScoredRecord> = eligible
        .into_iter()
        .map(|record| {
            let range_score = range
                .map(|m| m.score(record.range_position_pct, true))
                .unwrap_or(NEUTRAL_SCORE);

            let short_score = short
                .map(|m| m.score(record.short_absolute_change, true))
                .unwrap_or(NEUTRAL_SCORE);

            let pe_score = match (pe, record.pe_ratio) {
                (Some(m), Some(v)) if is_valid_pe(v) => m.score(Some(v), true),
                _ => NEUTRAL_SCORE,
            };

            let composite = range_score * WEIGHT_RANGE
                + short_score * WEIGHT_SHORT
                + pe_score * WEIGHT_PE;

            ScoredRecord {
                record: record.clone(),
                range_score,
                short_score,
                pe_score,
                composite_score: round_to(composite, 1),
                rank: 0,
            }
        })
        .collect();

    // `sort_by` is stable, so equal scores keep their input order.
    scored.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(Ordering::Equal)
    });
    for (idx, item) in scored.iter_mut().enumerate() {
        item.rank = (idx + 1) as u32;
    }

    if let Some(top) = scored.first() {
        tracing::info!(
            scored = scored.len(),
            top_ticker = %top.record.ticker,
            top_score = top.composite_score,
            "scoring complete"
        );
    }

    scored
}

fn is_eligible(record: &StockRecord) -> bool {
    let present = |v: Option<f64>| v.is_some_and(f64::is_finite);
    present(record.pe_ratio) && present(record.range_position_pct)
}

fn is_valid_pe(pe: f64) -> bool {
    pe > 0.0 && pe < PE_BAND_MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stock::{ShortInterestPoint, ShortTrend};
    use chrono::NaiveDate;

    fn record(
        ticker: &str,
        range: Option<f64>,
        pe: Option<f64>,
        short_change: Option<f64>,
    ) -> StockRecord {
        StockRecord {
            ticker: ticker.to_string(),
            company_name: format!("{ticker} Ltd"),
            sector: "Materials".to_string(),
            current_price: 10.0,
            market_cap: 1.0e9,
            pe_ratio: pe,
            week52_high: 12.0,
            week52_low: 8.0,
            range_position_pct: range,
            short_history: vec![ShortInterestPoint {
                date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                short_pct: 2.5,
            }],
            short_absolute_change: short_change,
            short_trend: ShortTrend::InsufficientData,
        }
    }

    fn find<'a>(scored: &'a [ScoredRecord], ticker: &str) -> &'a ScoredRecord {
        scored
            .iter()
            .find(|s| s.record.ticker == ticker)
            .unwrap()
    }

    #[test]
    fn two_stock_universe_scores_extremes() {
        let input = vec![
            record("CBA.AX", Some(57.1), Some(18.2), Some(0.3)),
            record("BHP.AX", Some(37.5), Some(12.5), Some(-0.5)),
        ];
        let scored = score(&input);

        let a = find(&scored, "BHP.AX");
        assert_eq!(a.range_score, 100.0);
        assert_eq!(a.pe_score, 100.0);
        assert_eq!(a.short_score, 100.0);
        assert_eq!(a.composite_score, 100.0);
        assert_eq!(a.rank, 1);

        let b = find(&scored, "CBA.AX");
        assert_eq!(b.range_score, 0.0);
        assert_eq!(b.pe_score, 0.0);
        assert_eq!(b.short_score, 0.0);
        assert_eq!(b.composite_score, 0.0);
        assert_eq!(b.rank, 2);

        // Input is not mutated; the scored copy carries the raw fields over.
        assert_eq!(input[1], a.record);
    }

    #[test]
    fn missing_pe_is_dropped_negative_pe_is_neutral() {
        let input = vec![
            record("AAA.AX", Some(10.0), None, None),
            record("BBB.AX", Some(20.0), Some(-5.0), None),
            record("CCC.AX", Some(30.0), Some(150.0), None),
            record("DDD.AX", Some(40.0), Some(15.0), None),
            record("EEE.AX", None, Some(15.0), None),
        ];
        let scored = score(&input);

        assert_eq!(scored.len(), 3);
        assert!(scored.iter().all(|s| s.record.ticker != "AAA.AX"));
        assert!(scored.iter().all(|s| s.record.ticker != "EEE.AX"));
        assert_eq!(find(&scored, "BBB.AX").pe_score, 50.0);
        assert_eq!(find(&scored, "CCC.AX").pe_score, 50.0);
        // Single valid P/E means no spread.
        assert_eq!(find(&scored, "DDD.AX").pe_score, 50.0);
    }

    #[test]
    fn no_valid_pe_scores_everyone_neutral() {
        let input = vec![
            record("AAA.AX", Some(10.0), Some(0.0), None),
            record("BBB.AX", Some(20.0), Some(100.0), None),
        ];
        let scored = score(&input);
        assert!(scored.iter().all(|s| s.pe_score == 50.0));
    }

    #[test]
    fn missing_short_data_stays_in_universe_with_neutral_score() {
        let input = vec![
            record("AAA.AX", Some(10.0), Some(10.0), Some(-1.0)),
            record("BBB.AX", Some(20.0), Some(20.0), None),
            record("CCC.AX", Some(30.0), Some(30.0), Some(1.0)),
        ];
        let scored = score(&input);
        assert_eq!(scored.len(), 3);
        assert_eq!(find(&scored, "AAA.AX").short_score, 100.0);
        assert_eq!(find(&scored, "BBB.AX").short_score, 50.0);
        assert_eq!(find(&scored, "CCC.AX").short_score, 0.0);
    }

    #[test]
    fn ranks_are_contiguous_and_ties_keep_input_order() {
        let input: Vec<StockRecord> = (0..8)
            .map(|i| {
                // Pairs of identical records produce ties.
                let v = (i / 2) as f64 * 10.0;
                record(&format!("T{i}.AX"), Some(v), Some(10.0 + v), None)
            })
            .collect();
        let scored = score(&input);

        let ranks: Vec<u32> = scored.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, (1..=8).collect::<Vec<u32>>());

        let tickers: Vec<&str> = scored.iter().map(|s| s.record.ticker.as_str()).collect();
        assert_eq!(
            tickers,
            vec!["T0.AX", "T1.AX", "T2.AX", "T3.AX", "T4.AX", "T5.AX", "T6.AX", "T7.AX"]
        );

        for w in scored.windows(2) {
            assert!(w[0].composite_score >= w[1].composite_score);
        }
    }

    #[test]
    fn scoring_is_deterministic_and_bounded() {
        let input = vec![
            record("AAA.AX", Some(0.0), Some(5.0), Some(0.4)),
            record("BBB.AX", Some(100.0), Some(95.0), Some(-2.0)),
            record("CCC.AX", Some(55.5), Some(-3.0), None),
            record("DDD.AX", Some(12.3), Some(33.0), Some(0.0)),
        ];
        let first = score(&input);
        let second = score(&input);
        assert_eq!(first, second);

        for s in &first {
            assert!((0.0..=100.0).contains(&s.composite_score));
            for sub in [s.range_score, s.short_score, s.pe_score] {
                assert!((0.0..=100.0).contains(&sub));
            }
        }
    }

    #[test]
    fn composite_rounds_to_one_decimal_half_even() {
        let input = vec![
            record("AAA.AX", Some(0.0), Some(80.0), None),
            record("BBB.AX", Some(100.0), Some(1.0), None),
            record("CCC.AX", Some(100.0), Some(81.0), None),
        ];
        let scored = score(&input);

        // 0.5 * 100 + 0.3 * 50 + 0.2 * 1.25 = 65.25
        let a = find(&scored, "AAA.AX");
        assert!((a.pe_score - 1.25).abs() < 1e-9);
        assert_eq!(a.composite_score, 65.2);
        assert_eq!(a.rank, 1);
        assert_eq!(find(&scored, "BBB.AX").composite_score, 35.0);
        assert_eq!(find(&scored, "CCC.AX").composite_score, 15.0);
    }

    #[test]
    fn non_finite_signals_are_ineligible() {
        let input = vec![
            record("INF.AX", Some(f64::INFINITY), Some(10.0), None),
            record("NAN.AX", Some(20.0), Some(f64::NAN), None),
            record("BBB.AX", Some(40.0), Some(15.0), None),
        ];
        let scored = score(&input);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].record.ticker, "BBB.AX");
        assert_eq!(scored[0].rank, 1);
    }

    #[test]
    fn empty_universe_scores_nothing() {
        assert!(score(&[]).is_empty());
    }

    #[test]
    fn weights_sum_to_one() {
        assert!((WEIGHT_RANGE + WEIGHT_SHORT + WEIGHT_PE - 1.0).abs() < 1e-12);
    }
}
