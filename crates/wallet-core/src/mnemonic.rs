use bip39::{Language, Mnemonic};
use crypto_utils::random::try_random_bytes;
use crypto_utils::{ZeroizingBytes, ZeroizingString};
use zeroize::Zeroize;

use crate::error::WalletError;

/// Supported BIP-39 phrase lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordCount {
    Twelve,
    Fifteen,
    Eighteen,
    TwentyOne,
    #[default]
    TwentyFour,
}

impl WordCount {
    pub fn words(&self) -> usize {
        match self {
            WordCount::Twelve => 12,
            WordCount::Fifteen => 15,
            WordCount::Eighteen => 18,
            WordCount::TwentyOne => 21,
            WordCount::TwentyFour => 24,
        }
    }

    /// 32 bits of entropy per 3 words.
    pub fn entropy_bytes(&self) -> usize {
        self.words() * 4 / 3
    }
}

impl TryFrom<usize> for WordCount {
    type Error = WalletError;

    fn try_from(words: usize) -> Result<Self, Self::Error> {
        match words {
            12 => Ok(WordCount::Twelve),
            15 => Ok(WordCount::Fifteen),
            18 => Ok(WordCount::Eighteen),
            21 => Ok(WordCount::TwentyOne),
            24 => Ok(WordCount::TwentyFour),
            n => Err(WalletError::InvalidMnemonic(format!(
                "expected 12, 15, 18, 21 or 24 words, got {n}"
            ))),
        }
    }
}

/// Generates a new English BIP-39 phrase from OS entropy.
pub fn generate_mnemonic(count: WordCount) -> Result<ZeroizingString, WalletError> {
    let mut entropy = try_random_bytes::<32>()
        .map_err(|e| WalletError::KeyGenerationFailed(e.to_string()))?;

    let result = Mnemonic::from_entropy_in(Language::English, &entropy[..count.entropy_bytes()])
        .map_err(|e| WalletError::KeyGenerationFailed(e.to_string()));
    entropy.zeroize();

    Ok(ZeroizingString::new(result?.to_string()))
}

/// Collapses whitespace and lowercases, so pasted phrases parse.
pub fn normalize_phrase(phrase: &str) -> ZeroizingString {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    ZeroizingString::new(words.join(" ").to_lowercase())
}

/// Checks word count and the BIP-39 checksum.
pub fn validate_mnemonic(phrase: &str) -> Result<(), WalletError> {
    parse(phrase).map(|_| ())
}

/// 64-byte BIP-39 seed for `phrase` and optional `passphrase`.
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<ZeroizingBytes, WalletError> {
    let mnemonic = parse(phrase)?;
    let mut seed = mnemonic.to_seed(passphrase);
    let out = ZeroizingBytes::from(&seed[..]);
    seed.zeroize();
    Ok(out)
}

fn parse(phrase: &str) -> Result<Mnemonic, WalletError> {
    let normalized = normalize_phrase(phrase);
    WordCount::try_from(normalized.split(' ').filter(|w| !w.is_empty()).count())?;
    Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON_12: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn generated_phrases_have_requested_length() {
        for count in [
            WordCount::Twelve,
            WordCount::Fifteen,
            WordCount::Eighteen,
            WordCount::TwentyOne,
            WordCount::TwentyFour,
        ] {
            let phrase = generate_mnemonic(count).unwrap();
            assert_eq!(phrase.split_whitespace().count(), count.words());
            validate_mnemonic(&phrase).unwrap();
        }
    }

    #[test]
    fn entropy_sizes() {
        assert_eq!(WordCount::Twelve.entropy_bytes(), 16);
        assert_eq!(WordCount::Fifteen.entropy_bytes(), 20);
        assert_eq!(WordCount::Eighteen.entropy_bytes(), 24);
        assert_eq!(WordCount::TwentyOne.entropy_bytes(), 28);
        assert_eq!(WordCount::TwentyFour.entropy_bytes(), 32);
    }

    #[test]
    fn wrong_word_count_rejected() {
        let eleven = ABANDON_12.rsplit_once(' ').unwrap().0;
        assert!(matches!(
            validate_mnemonic(eleven),
            Err(WalletError::InvalidMnemonic(_))
        ));
        assert!(WordCount::try_from(13).is_err());
    }

    #[test]
    fn bad_checksum_rejected() {
        let bad = ABANDON_12.replace("about", "abandon");
        assert!(validate_mnemonic(&bad).is_err());
    }

    #[test]
    fn unknown_word_rejected() {
        let bad = ABANDON_12.replace("about", "notaword");
        assert!(validate_mnemonic(&bad).is_err());
    }

    #[test]
    fn messy_whitespace_and_case_accepted() {
        let messy = format!("  {}  ", ABANDON_12.to_uppercase().replace(' ', "   "));
        validate_mnemonic(&messy).unwrap();
        assert_eq!(
            mnemonic_to_seed(&messy, "").unwrap(),
            mnemonic_to_seed(ABANDON_12, "").unwrap()
        );
    }

    #[test]
    fn bip39_seed_vector() {
        let seed = mnemonic_to_seed(ABANDON_12, "").unwrap();
        assert_eq!(
            hex::encode(&*seed),
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1\
             9a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
    }

    #[test]
    fn passphrase_changes_seed() {
        let plain = mnemonic_to_seed(ABANDON_12, "").unwrap();
        let salted = mnemonic_to_seed(ABANDON_12, "TREZOR").unwrap();
        assert_ne!(plain, salted);
    }
}
