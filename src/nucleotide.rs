//src/nucleotide.rs

use std::cmp::Ordering;

/// Key order shared by every sorted-merge command so they all agree on "sorted".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NucleotideOrder {
    /// Plain byte order, i.e. A<C<G<T.
    #[default]
    Lexicographic,
    /// The A<C<T<G order produced by 2-bit encoders that map A=0, C=1, T=2, G=3.
    Actg,
}

impl NucleotideOrder {
    pub fn from_actg_flag(actg: bool) -> Self {
        if actg {
            NucleotideOrder::Actg
        } else {
            NucleotideOrder::Lexicographic
        }
    }
}

const fn build_rc_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = i as u8;
        i += 1;
    }
    table[b'A' as usize] = b'T';
    table[b'C' as usize] = b'G';
    table[b'G' as usize] = b'C';
    table[b'T' as usize] = b'A';
    table[b'N' as usize] = b'N';
    table[b'a' as usize] = b't';
    table[b'c' as usize] = b'g';
    table[b'g' as usize] = b'c';
    table[b't' as usize] = b'a';
    table[b'n' as usize] = b'n';
    table
}

const fn build_actg_rank_table() -> [u8; 256] {
    // Anything outside the alphabet sorts after G.
    let mut table = [4u8; 256];
    table[b'A' as usize] = 0;
    table[b'a' as usize] = 0;
    table[b'C' as usize] = 1;
    table[b'c' as usize] = 1;
    table[b'T' as usize] = 2;
    table[b't' as usize] = 2;
    table[b'G' as usize] = 3;
    table[b'g' as usize] = 3;
    table
}

static RC_TABLE: [u8; 256] = build_rc_table();
static ACTG_RANK: [u8; 256] = build_actg_rank_table();

/// Compare two k-mers under `order`. A strict prefix sorts first.
pub fn compare(a: &str, b: &str, order: NucleotideOrder) -> Ordering {
    compare_bytes(a.as_bytes(), b.as_bytes(), order)
}

pub fn compare_bytes(a: &[u8], b: &[u8], order: NucleotideOrder) -> Ordering {
    match order {
        NucleotideOrder::Lexicographic => a.cmp(b),
        NucleotideOrder::Actg => {
            for (&x, &y) in a.iter().zip(b.iter()) {
                let r = ACTG_RANK[x as usize].cmp(&ACTG_RANK[y as usize]);
                if r != Ordering::Equal {
                    return r;
                }
            }
            a.len().cmp(&b.len())
        }
    }
}

/// Complement of a single base (A<->T, C<->G, N<->N). Case is kept.
#[inline]
pub fn complement(base: u8) -> u8 {
    RC_TABLE[base as usize]
}

pub fn reverse_complement_in_place(seq: &mut [u8]) {
    seq.reverse();
    for b in seq.iter_mut() {
        *b = complement(*b);
    }
}

pub fn reverse_complement(seq: &str) -> String {
    seq.chars()
        .rev()
        .map(|c| if c.is_ascii() { complement(c as u8) as char } else { c })
        .collect()
}

/// `true` iff `seq` is not greater than its reverse complement under `order`.
/// Palindromes are canonical.
pub fn is_canonical(seq: &[u8], order: NucleotideOrder) -> bool {
    let n = seq.len();
    for i in 0..n {
        let fc = seq[i];
        let rc = complement(seq[n - 1 - i]);
        if fc != rc {
            return match order {
                NucleotideOrder::Lexicographic => fc < rc,
                NucleotideOrder::Actg => ACTG_RANK[fc as usize] < ACTG_RANK[rc as usize],
            };
        }
    }
    true
}

/// Lexicographically smaller of `seq` and its reverse complement.
pub fn canonical(seq: &[u8]) -> Vec<u8> {
    let mut rc = seq.to_vec();
    reverse_complement_in_place(&mut rc);
    if seq <= rc.as_slice() {
        seq.to_vec()
    } else {
        rc
    }
}

#[inline]
pub fn is_nucleotide(b: u8) -> bool {
    matches!(b, b'A' | b'C' | b'G' | b'T' | b'a' | b'c' | b'g' | b't')
}

pub fn is_valid_kmer(kmer: &[u8]) -> bool {
    !kmer.is_empty() && kmer.iter().all(|&b| is_nucleotide(b))
}

/// Number of whitespace-separated fields, i.e. the sample count of a row tail.
pub fn count_fields(text: &str) -> usize {
    text.split_ascii_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_kmers(k: usize) -> Vec<String> {
        let mut out = vec![String::new()];
        for _ in 0..k {
            out = out
                .into_iter()
                .flat_map(|p| ["A", "C", "G", "T"].into_iter().map(move |b| format!("{p}{b}")))
                .collect();
        }
        out
    }

    #[test]
    fn test_reverse_complement_round_trip() {
        for kmer in all_kmers(5) {
            assert_eq!(reverse_complement(&reverse_complement(&kmer)), kmer);
        }
        assert_eq!(reverse_complement("AACGN"), "NCGTT");
        assert_eq!(reverse_complement("acgT"), "Acgt");
    }

    #[test]
    fn test_exactly_one_strand_is_canonical() {
        for order in [NucleotideOrder::Lexicographic, NucleotideOrder::Actg] {
            for kmer in all_kmers(4) {
                let rc = reverse_complement(&kmer);
                let fw = is_canonical(kmer.as_bytes(), order);
                let bw = is_canonical(rc.as_bytes(), order);
                if rc == kmer {
                    assert!(fw && bw, "palindrome {kmer} must be canonical");
                } else {
                    assert!(fw ^ bw, "{kmer}/{rc} under {order:?}");
                }
            }
        }
    }

    #[test]
    fn test_canonical_depends_on_order() {
        assert!(is_canonical(b"CCC", NucleotideOrder::Actg));
        assert!(is_canonical(b"AG", NucleotideOrder::Lexicographic));
        // TA is a palindrome.
        assert!(is_canonical(b"TA", NucleotideOrder::Actg));
        // GA vs TC: G<T lexicographically, T<G in ACTG order.
        assert!(is_canonical(b"GA", NucleotideOrder::Lexicographic));
        assert!(!is_canonical(b"GA", NucleotideOrder::Actg));
    }

    #[test]
    fn test_compare_orders() {
        use NucleotideOrder::*;
        assert_eq!(compare("AAG", "AAT", Lexicographic), Ordering::Less);
        assert_eq!(compare("AAG", "AAT", Actg), Ordering::Greater);
        assert_eq!(compare("ACT", "ACT", Actg), Ordering::Equal);
        assert_eq!(compare("AC", "ACA", Actg), Ordering::Less);
        assert_eq!(compare("ACA", "AC", Lexicographic), Ordering::Greater);
    }

    #[test]
    fn test_alphabet_and_fields() {
        assert!(is_valid_kmer(b"ACGTacgt"));
        assert!(!is_valid_kmer(b"ACGN"));
        assert!(!is_valid_kmer(b""));
        assert_eq!(count_fields("1 2\t3  4"), 4);
        assert_eq!(count_fields(""), 0);
        assert_eq!(canonical(b"TTT"), b"AAA".to_vec());
        assert_eq!(canonical(b"ACG"), b"ACG".to_vec());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_reverse_complement_round_trip(seq in "[ACGT]{1,64}") {
                let rc = reverse_complement(&seq);
                prop_assert_eq!(rc.len(), seq.len());
                prop_assert_eq!(reverse_complement(&rc), seq);
            }

            #[test]
            fn prop_canonical_is_one_of_both_strands(seq in "[ACGT]{1,64}") {
                let rc = reverse_complement(&seq);
                let c = canonical(seq.as_bytes());
                prop_assert!(c == seq.as_bytes() || c == rc.as_bytes());
                prop_assert_eq!(canonical(rc.as_bytes()), c.clone());
                prop_assert!(is_canonical(&c, NucleotideOrder::Lexicographic));
            }
        }
    }
}
