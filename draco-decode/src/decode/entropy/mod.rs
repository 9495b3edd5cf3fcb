pub(crate) mod rans;
pub(crate) mod symbol_coding;

use crate::decode::Err;

/// Renormalization floor of the binary (rabs) coder.
pub(crate) const L_RABS_BASE: u64 = 4096;

/// Precision of the binary coder: probabilities live in [0, 256).
pub(crate) const RABS_PRECISION: u64 = 256;

/// Precision in bits for a rANS decoder over symbols of at most
/// `symbol_bit_length` bits.
pub(crate) const fn compute_rans_precision_bits(symbol_bit_length: u32) -> u32 {
    let unclamped = (3 * symbol_bit_length + 1) / 2;
    if unclamped < 12 {
        12
    } else if unclamped > 20 {
        20
    } else {
        unclamped
    }
}

pub(crate) struct RansSymbol {
    pub freq_count: u32,
    pub freq_cumulative: u32,
}

/// Builds the cumulative table and the flat slot->symbol lookup of size
/// `1 << precision_bits`. Fails unless the frequencies sum exactly to the
/// precision.
pub(crate) fn rans_build_tables(
    freq_counts: &[u32],
    precision_bits: u32,
    offset: usize,
) -> Result<(Vec<u32>, Vec<RansSymbol>), Err> {
    let precision: u64 = 1 << precision_bits;
    let mut slot_table = Vec::with_capacity(precision as usize);
    let mut rans_syms = Vec::with_capacity(freq_counts.len());

    let mut freq_cumulative: u64 = 0;
    for (i, &freq_count) in freq_counts.iter().enumerate() {
        rans_syms.push(RansSymbol {
            freq_count,
            freq_cumulative: freq_cumulative as u32,
        });
        freq_cumulative += freq_count as u64;
        if freq_cumulative > precision {
            return Err(Err::Corrupt(
                "rans cumulative probability overflows the precision".to_string(),
                offset,
            ));
        }
        for _ in 0..freq_count {
            slot_table.push(i as u32);
        }
    }

    if freq_cumulative != precision {
        return Err(Err::Corrupt(
            format!(
                "rans probabilities sum to {} instead of the precision {}",
                freq_cumulative, precision
            ),
            offset,
        ));
    }

    Ok((slot_table, rans_syms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_is_clamped() {
        assert_eq!(compute_rans_precision_bits(1), 12);
        assert_eq!(compute_rans_precision_bits(5), 12);
        assert_eq!(compute_rans_precision_bits(10), 15);
        assert_eq!(compute_rans_precision_bits(14), 20);
        assert_eq!(compute_rans_precision_bits(18), 20);
    }

    #[test]
    fn table_build_rejects_bad_sums() {
        // Sums to 8, precision is 4096.
        assert!(rans_build_tables(&[3, 5], 12, 0).is_err());
        let freqs = vec![4096u32];
        let (slots, syms) = rans_build_tables(&freqs, 12, 0).unwrap();
        assert_eq!(slots.len(), 4096);
        assert_eq!(syms[0].freq_cumulative, 0);
    }
}
