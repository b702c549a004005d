//! Anonymous display-name generation

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "brisk", "calm", "clever", "curious", "eager", "gentle", "keen", "lively", "mellow", "nimble",
    "quick", "quiet", "sharp", "sunny", "swift", "witty",
];

const ANIMALS: &[&str] = &[
    "badger", "crane", "falcon", "fox", "heron", "ibex", "lynx", "marten", "otter", "owl",
    "puffin", "raven", "seal", "stoat", "swift", "wren",
];

/// A readable throwaway name like `nimble-otter-42`. Not unique by
/// construction; users are identified by uid, the name is display only.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&"curious");
    let animal = ANIMALS.choose(&mut rng).unwrap_or(&"fox");
    let number: u8 = rng.gen_range(10..100);
    format!("{adjective}-{animal}-{number}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_have_three_parts() {
        let name = generate();
        assert_eq!(name.split('-').count(), 3);
    }
}
