//! Random locally-administered MAC address generation for microVM/unikernel taps.

use rand::Rng;

/// Generate a locally-administered MAC address `00:XX:XX:XX:XX:XX`.
pub fn random_mac_address() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 5] = std::array::from_fn(|_| rng.random());
    format!(
        "00:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_has_expected_shape() {
        let mac = random_mac_address();
        assert!(mac.starts_with("00:"));
        assert_eq!(mac.split(':').count(), 6);
        for octet in mac.split(':') {
            assert_eq!(octet.len(), 2);
            assert!(u8::from_str_radix(octet, 16).is_ok());
        }
    }

    #[test]
    fn mac_addresses_are_not_constant() {
        let a = random_mac_address();
        let b = random_mac_address();
        // Not a hard uniqueness guarantee, but a stuck RNG would fail this
        // virtually every run.
        assert_ne!(a, b);
    }
}
