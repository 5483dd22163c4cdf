// TOTP MFA: SHA1, 6 digits, 30 s period, skew 1

use anyhow::Context;
use totp_rs::{Algorithm, Secret, TOTP};

const ISSUER: &str = "Fleetwatch";
const DIGITS: usize = 6;
const SKEW: u8 = 1;
const PERIOD: u64 = 30;

fn totp_for(secret_b32: &str, account: &str) -> anyhow::Result<TOTP> {
    let bytes = Secret::Encoded(secret_b32.to_string())
        .to_bytes()
        .map_err(|e| anyhow::anyhow!("invalid TOTP secret: {:?}", e))?;
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        PERIOD,
        bytes,
        Some(ISSUER.to_string()),
        account.to_string(),
    )
    .map_err(|e| anyhow::anyhow!("TOTP init failed: {:?}", e))
}

/// Generate a fresh secret. Returns (base32 secret, otpauth:// URL for QR
/// provisioning).
pub fn generate(account: &str) -> anyhow::Result<(String, String)> {
    let secret = Secret::generate_secret();
    let Secret::Encoded(encoded) = secret.to_encoded() else {
        anyhow::bail!("secret encoding failed");
    };
    let totp = totp_for(&encoded, account)?;
    Ok((encoded, totp.get_url()))
}

/// Validate a 6-digit code against a stored secret with ±1 period skew.
pub fn validate(code: &str, secret_b32: &str) -> bool {
    match totp_for(secret_b32, "admin") {
        Ok(totp) => totp.check_current(code).unwrap_or(false),
        Err(_) => false,
    }
}

/// Current code for a secret; used by enrollment tests.
pub fn current_code(secret_b32: &str) -> anyhow::Result<String> {
    totp_for(secret_b32, "admin")?
        .generate_current()
        .context("TOTP code generation failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_round_trips() {
        let (secret, url) = generate("admin@fleetwatch").unwrap();
        assert!(url.starts_with("otpauth://totp/"));
        let code = current_code(&secret).unwrap();
        assert_eq!(code.len(), 6);
        assert!(validate(&code, &secret));
    }

    #[test]
    fn wrong_code_is_rejected() {
        let (secret, _) = generate("admin@fleetwatch").unwrap();
        let code = current_code(&secret).unwrap();
        // flip one digit
        let bad: String = code
            .chars()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    char::from_digit((c.to_digit(10).unwrap_or(0) + 1) % 10, 10).unwrap_or('0')
                } else {
                    c
                }
            })
            .collect();
        assert!(!validate(&bad, &secret));
    }

    #[test]
    fn garbage_secret_is_rejected() {
        assert!(!validate("123456", "not base32 !!!"));
    }
}
