use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::alphabet::Alphabet;
use crate::fasta::FastaReader;

/// Encoded sequences of one Pfam split together with their family labels.
#[derive(Clone, Debug, Default)]
pub struct PfamDataset {
    families: Vec<String>,
    sequences: Vec<Vec<u32>>,
}

impl PfamDataset {
    pub fn new(families: Vec<String>, sequences: Vec<Vec<u32>>) -> Result<Self> {
        if families.len() != sequences.len() {
            return Err(anyhow!(
                "family count {} does not match sequence count {}",
                families.len(),
                sequences.len()
            ));
        }
        Ok(Self {
            families,
            sequences,
        })
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn sequences(&self) -> &[Vec<u32>] {
        &self.sequences
    }

    pub fn families(&self) -> &[String] {
        &self.families
    }

    pub fn family_count(&self) -> usize {
        self.families.iter().collect::<HashSet<_>>().len()
    }

    /// Residues excluding the two flanking tokens of every sequence.
    pub fn residue_count(&self) -> usize {
        self.sequences
            .iter()
            .map(|seq| seq.len().saturating_sub(2))
            .sum()
    }
}

/// Encodes a residue string and flanks it with the start/stop token 0.
pub fn preprocess_sequence(sequence: &[u8], alphabet: &dyn Alphabet) -> Vec<u32> {
    let mut tokens = Vec::with_capacity(sequence.len() + 2);
    tokens.push(0);
    tokens.extend(alphabet.encode(sequence).into_iter().map(|code| code + 1));
    tokens.push(0);
    tokens
}

/// Pfam headers end in `...;<family>;`, the family is the second-to-last field.
pub fn family_from_name(name: &[u8]) -> Result<String> {
    let fields: Vec<&[u8]> = name.split(|&byte| byte == b';').collect();
    if fields.len() < 2 {
        return Err(anyhow!(
            "record {:?} has no `;`-delimited family field",
            String::from_utf8_lossy(name)
        ));
    }
    Ok(String::from_utf8_lossy(fields[fields.len() - 2]).into_owned())
}

pub fn load_pfam(path: impl AsRef<Path>, alphabet: &dyn Alphabet) -> Result<PfamDataset> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut families = Vec::new();
    let mut sequences = Vec::new();
    for record in FastaReader::new(BufReader::new(file)) {
        let record = record.with_context(|| format!("failed to parse {}", path.display()))?;
        families.push(
            family_from_name(&record.name)
                .with_context(|| format!("malformed Pfam header in {}", path.display()))?,
        );
        sequences.push(preprocess_sequence(&record.sequence, alphabet));
    }

    let dataset = PfamDataset::new(families, sequences)?;
    info!(
        "loaded {} sequences ({} families) from {}",
        dataset.len(),
        dataset.family_count(),
        path.display()
    );
    Ok(dataset)
}
