mod uniprot;

pub use uniprot::Uniprot21;

/// Maps residue bytes to dense integer codes.
pub trait Alphabet: Send + Sync {
    fn encode_byte(&self, byte: u8) -> u32;
    fn decode(&self, code: u32) -> Option<u8>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn encode(&self, sequence: &[u8]) -> Vec<u32> {
        sequence.iter().map(|&byte| self.encode_byte(byte)).collect()
    }
}

/// Token layout used by the language model on top of an alphabet.
///
/// Residue codes are shifted by one so that 0 can flank every sequence as the
/// start/stop token. The last input index doubles as padding, which means the
/// highest shifted residue code (the alphabet's "unknown" slot) is masked out
/// of the objective together with padding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenLayout {
    pub n_tokens: usize,
    pub n_input: usize,
    pub n_output: usize,
    pub mask_idx: usize,
}

impl TokenLayout {
    pub fn for_alphabet(alphabet: &dyn Alphabet) -> Self {
        let n_tokens = alphabet.len();
        Self {
            n_tokens,
            n_input: n_tokens + 1,
            n_output: n_tokens,
            mask_idx: n_tokens,
        }
    }
}
