//! Age encryption of artifact payloads: public-key recipients encrypt,
//! private-key identities decrypt. Output is ASCII-armored so encrypted
//! layers stay printable.

use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use age::armor::{ArmoredReader, ArmoredWriter, Format};
use age::x25519;

use crate::{Error, Result};

pub fn encrypt(data: &[u8], recipients: &[x25519::Recipient]) -> Result<Vec<u8>> {
    let boxed: Vec<Box<dyn age::Recipient + Send>> = recipients
        .iter()
        .map(|r| Box::new(r.clone()) as Box<dyn age::Recipient + Send>)
        .collect();
    let encryptor = age::Encryptor::with_recipients(boxed)
        .ok_or_else(|| Error::Encrypt("no recipients given".into()))?;

    let mut out = Vec::new();
    let armor = ArmoredWriter::wrap_output(&mut out, Format::AsciiArmor)
        .map_err(|e| Error::Encrypt(e.to_string()))?;
    let mut writer = encryptor
        .wrap_output(armor)
        .map_err(|e| Error::Encrypt(e.to_string()))?;
    writer
        .write_all(data)
        .map_err(|e| Error::Encrypt(e.to_string()))?;
    let armor = writer.finish().map_err(|e| Error::Encrypt(e.to_string()))?;
    armor.finish().map_err(|e| Error::Encrypt(e.to_string()))?;
    Ok(out)
}

pub fn decrypt(data: &[u8], identities: &[x25519::Identity]) -> Result<Vec<u8>> {
    let decryptor = match age::Decryptor::new(ArmoredReader::new(data))
        .map_err(|e| Error::Decrypt(e.to_string()))?
    {
        age::Decryptor::Recipients(d) => d,
        age::Decryptor::Passphrase(_) => {
            return Err(Error::Decrypt("artifact is passphrase-encrypted".into()))
        }
    };

    let mut reader = decryptor
        .decrypt(identities.iter().map(|i| i as &dyn age::Identity))
        .map_err(|e| Error::Decrypt(e.to_string()))?;
    let mut out = Vec::new();
    reader
        .read_to_end(&mut out)
        .map_err(|e| Error::Decrypt(e.to_string()))?;
    Ok(out)
}

/// Reads age public keys (one per line, `#` comments allowed) from a file.
pub fn parse_recipients_file(path: &Path) -> Result<Vec<x25519::Recipient>> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::Encrypt(format!("reading {}: {e}", path.display())))?;
    let mut recipients = Vec::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let recipient = x25519::Recipient::from_str(line)
            .map_err(|e| Error::Encrypt(format!("invalid recipient in {}: {e}", path.display())))?;
        recipients.push(recipient);
    }
    Ok(recipients)
}

/// Reads age identities (private keys generated by age-keygen) from a file.
pub fn parse_identities_file(path: &Path) -> Result<Vec<x25519::Identity>> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::Decrypt(format!("reading {}: {e}", path.display())))?;
    let mut identities = Vec::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let identity = x25519::Identity::from_str(line)
            .map_err(|e| Error::Decrypt(format!("invalid identity in {}: {e}", path.display())))?;
        identities.push(identity);
    }
    Ok(identities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let identity = x25519::Identity::generate();
        let recipient = identity.to_public();
        let plaintext = b"apiVersion: v1\nkind: Secret\n";

        let ciphertext = encrypt(plaintext, &[recipient]).unwrap();
        assert!(ciphertext.starts_with(b"-----BEGIN AGE ENCRYPTED FILE-----"));

        let decrypted = decrypt(&ciphertext, &[identity]).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_identity_fails() {
        let identity = x25519::Identity::generate();
        let other = x25519::Identity::generate();
        let ciphertext = encrypt(b"payload", &[identity.to_public()]).unwrap();
        assert!(decrypt(&ciphertext, &[other]).is_err());
    }

    #[test]
    fn no_recipients_is_an_error() {
        assert!(encrypt(b"payload", &[]).is_err());
    }
}
