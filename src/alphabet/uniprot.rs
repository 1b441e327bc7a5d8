use super::Alphabet;

const LETTERS: &[u8; 21] = b"ARNDCQEGHILKMFPSTWYVX";
const MISSING: u32 = 20;

/// The 20 standard amino acids plus `X`, with rare residues folded onto their
/// closest standard code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uniprot21 {
    table: [u32; 256],
}

impl Uniprot21 {
    pub fn new() -> Self {
        let mut table = [MISSING; 256];
        for (code, &letter) in LETTERS.iter().enumerate() {
            table[letter as usize] = code as u32;
        }
        // pyrrolysine -> lysine, selenocysteine -> cysteine, ambiguous -> X
        table[b'O' as usize] = 11;
        table[b'U' as usize] = 4;
        table[b'B' as usize] = MISSING;
        table[b'Z' as usize] = MISSING;
        Self { table }
    }
}

impl Default for Uniprot21 {
    fn default() -> Self {
        Self::new()
    }
}

impl Alphabet for Uniprot21 {
    fn encode_byte(&self, byte: u8) -> u32 {
        self.table[byte as usize]
    }

    fn decode(&self, code: u32) -> Option<u8> {
        LETTERS.get(code as usize).copied()
    }

    fn len(&self) -> usize {
        LETTERS.len()
    }
}
