//! Output script → address rendering.

use bitcoin::{Address, Network, PublicKey, Script};

use chainscan_core::feed::AddressResolver;

const OP_CHECKSIG: u8 = 0xac;

/// Renders standard output scripts as addresses for one network.
///
/// P2PKH, P2SH and every segwit version go through [`Address::from_script`].
/// Bare pay-to-pubkey outputs, common in early blocks, are shown as the
/// P2PKH address of their key. Anything else has no address form.
#[derive(Debug, Clone, Copy)]
pub struct BitcoinAddressResolver {
    network: Network,
}

impl BitcoinAddressResolver {
    pub fn new(network: Network) -> Self {
        Self { network }
    }
}

impl AddressResolver for BitcoinAddressResolver {
    fn resolve(&self, script_pubkey: &[u8]) -> Option<String> {
        let script = Script::from_bytes(script_pubkey);
        if let Ok(address) = Address::from_script(script, self.network) {
            return Some(address.to_string());
        }
        let key = p2pk_key(script_pubkey)?;
        Some(Address::p2pkh(key.pubkey_hash(), self.network).to_string())
    }
}

/// `<33 or 65 byte key> OP_CHECKSIG`
fn p2pk_key(script: &[u8]) -> Option<PublicKey> {
    let (&push, rest) = script.split_first()?;
    let (&last, key) = rest.split_last()?;
    let valid_len = matches!(push, 33 | 65) && key.len() == push as usize;
    if !valid_len || last != OP_CHECKSIG {
        return None;
    }
    PublicKey::from_slice(key).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::blockdata::constants::genesis_block;

    fn mainnet() -> BitcoinAddressResolver {
        BitcoinAddressResolver::new(Network::Bitcoin)
    }

    #[test]
    fn genesis_pay_to_pubkey() {
        let genesis = genesis_block(Network::Bitcoin);
        let script = genesis.txdata[0].output[0].script_pubkey.as_bytes();
        assert_eq!(
            mainnet().resolve(script).as_deref(),
            Some("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa")
        );
    }

    #[test]
    fn pay_to_pubkey_hash() {
        // OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
        let script =
            hex::decode("76a91462e907b15cbf27d5425399ebf6f0fb50ebb88f1888ac").unwrap();
        assert_eq!(
            mainnet().resolve(&script).as_deref(),
            Some("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa")
        );
    }

    #[test]
    fn segwit_v0_keyhash() {
        let script = hex::decode("0014751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        assert_eq!(
            mainnet().resolve(&script).as_deref(),
            Some("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4")
        );
    }

    #[test]
    fn testnet_prefix() {
        let script = hex::decode("0014751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        let resolved = BitcoinAddressResolver::new(Network::Testnet).resolve(&script);
        assert!(resolved.unwrap().starts_with("tb1q"));
    }

    #[test]
    fn non_standard_scripts_are_unresolved() {
        assert_eq!(mainnet().resolve(&[]), None);
        // OP_RETURN "hi"
        assert_eq!(mainnet().resolve(&[0x6a, 0x02, b'h', b'i']), None);
        // right shape, invalid key bytes
        let mut bogus = vec![33u8];
        bogus.extend([0x07; 33]);
        bogus.push(OP_CHECKSIG);
        assert_eq!(mainnet().resolve(&bogus), None);
    }
}
