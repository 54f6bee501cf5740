//! Certificate Authority (C1).
//!
//! Loads or generates the root key/cert and mints leaf certificates for
//! hostnames on demand. Grounded in the `rcgen`-based CA/leaf generation
//! seen across the pack's MITM-adjacent proxies (e.g.
//! `examples/other_examples/...claude_proxy-tls_handler.rs`,
//! `...onixus-bsdm-proxy__proxy-src-main.rs`), which is the idiomatic
//! replacement for the Python prototype's `cryptography.x509` builder
//! (`examples/original_source/certificate_authority.py`).

use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SanType, PKCS_RSA_SHA256,
};
use time::{Duration as TimeDuration, OffsetDateTime};

use crate::error::CertError;

const CA_ORGANIZATION: &str = "MITM Proxy";
const CA_COMMON_NAME: &str = "MITM Proxy CA";
const CA_VALIDITY_DAYS: i64 = 365;
const LEAF_VALIDITY_DAYS: i64 = 30;

/// A minted (or loaded) certificate plus its private key, both PEM
/// encoded, ready to be written to disk or fed to a TLS acceptor.
pub struct IssuedCert {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Holds the root key pair and certificate used to sign every leaf.
pub struct CertificateAuthority {
    ca_cert: Certificate,
    ca_key: KeyPair,
}

impl CertificateAuthority {
    /// Load the CA from `cert_path`/`key_path` if both exist, otherwise
    /// generate a fresh self-signed CA and persist it there.
    ///
    /// File I/O errors here are fatal: the caller is expected to abort
    /// startup on `Err`, per spec.md §4.1.
    pub fn load_or_generate(cert_path: &Path, key_path: &Path) -> Result<Self, CertError> {
        if cert_path.exists() && key_path.exists() {
            Self::load(cert_path, key_path)
        } else {
            let ca = Self::generate()?;
            ca.persist(cert_path, key_path)?;
            Ok(ca)
        }
    }

    fn generate() -> Result<Self, CertError> {
        // spec.md §3/§4.1 call for a 2048-bit RSA root key, not rcgen's
        // default ECDSA P-256.
        let key_pair =
            KeyPair::generate_for(&PKCS_RSA_SHA256).map_err(|e| CertError::KeyGen(e.to_string()))?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CountryName, "US");
        dn.push(DnType::OrganizationName, CA_ORGANIZATION);
        dn.push(DnType::CommonName, CA_COMMON_NAME);

        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.not_before = OffsetDateTime::now_utc() - TimeDuration::minutes(5);
        params.not_after = OffsetDateTime::now_utc() + TimeDuration::days(CA_VALIDITY_DAYS);

        let ca_cert = params
            .self_signed(&key_pair)
            .map_err(|e| CertError::Build(e.to_string()))?;

        Ok(Self {
            ca_cert,
            ca_key: key_pair,
        })
    }

    fn persist(&self, cert_path: &Path, key_path: &Path) -> Result<(), CertError> {
        std::fs::write(cert_path, self.ca_cert.pem())?;
        std::fs::write(key_path, self.ca_key.serialize_pem())?;
        Ok(())
    }

    fn load(cert_path: &Path, key_path: &Path) -> Result<Self, CertError> {
        let cert_pem = std::fs::read_to_string(cert_path)?;
        let key_pem = std::fs::read_to_string(key_path)?;

        let key_pair = KeyPair::from_pem(&key_pem).map_err(|e| CertError::Parse(e.to_string()))?;

        // rcgen has no standalone "load a CA from PEM" constructor: a
        // `Certificate` is always the product of signing `Params` with a
        // `KeyPair`. We parse the on-disk cert purely to recover its
        // params (subject, validity, serial) and re-wrap it around the
        // loaded key, which reproduces the identical DER/PEM bytes that
        // were persisted (the key and the subject fully determine the
        // self-signed cert).
        let params = CertificateParams::from_ca_cert_pem(&cert_pem)
            .map_err(|e| CertError::Parse(e.to_string()))?;
        let ca_cert = params
            .self_signed(&key_pair)
            .map_err(|e| CertError::Build(e.to_string()))?;

        Ok(Self {
            ca_cert,
            ca_key: key_pair,
        })
    }

    /// Mint a fresh leaf certificate for `hostname`, signed by this CA.
    /// Not cached here — callers cache through the cert cache (C2).
    pub fn mint(&self, hostname: &str) -> Result<IssuedCert, CertError> {
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, hostname);

        let mut params = CertificateParams::new(vec![hostname.to_string()])
            .map_err(|e| CertError::Build(e.to_string()))?;
        params.distinguished_name = dn;
        params.not_before = OffsetDateTime::now_utc() - TimeDuration::minutes(5);
        params.not_after = OffsetDateTime::now_utc() + TimeDuration::days(LEAF_VALIDITY_DAYS);
        params.subject_alt_names = vec![
            SanType::DnsName(
                hostname
                    .to_string()
                    .try_into()
                    .map_err(|_| CertError::Build(format!("invalid hostname: {hostname}")))?,
            ),
            SanType::DnsName(
                format!("*.{hostname}")
                    .try_into()
                    .map_err(|_| CertError::Build(format!("invalid hostname: {hostname}")))?,
            ),
        ];

        // leaf keys are RSA-2048 too (spec.md §4.1).
        let key_pair =
            KeyPair::generate_for(&PKCS_RSA_SHA256).map_err(|e| CertError::KeyGen(e.to_string()))?;
        let cert = params
            .signed_by(&key_pair, &self.ca_cert, &self.ca_key)
            .map_err(|e| CertError::Build(e.to_string()))?;

        Ok(IssuedCert {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }
}

/// Default on-disk locations, relative to the process working directory,
/// per spec.md §6.
pub fn default_ca_paths(cert: &str, key: &str) -> (PathBuf, PathBuf) {
    (PathBuf::from(cert), PathBuf::from(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::string::Ia5String;

    #[test]
    fn mint_produces_cert_verifiable_against_ca() {
        let ca = CertificateAuthority::generate().expect("generate ca");
        let leaf = ca.mint("example.test").expect("mint leaf");

        // the leaf cert parses and carries both required SAN entries
        let (_, cert) = x509_parser::pem::parse_x509_pem(leaf.cert_pem.as_bytes())
            .expect("parse leaf pem");
        let x509 = cert.parse_x509().expect("parse x509");
        let sans: Vec<String> = x509
            .subject_alternative_name()
            .ok()
            .flatten()
            .map(|ext| {
                ext.value
                    .general_names
                    .iter()
                    .filter_map(|gn| match gn {
                        x509_parser::extensions::GeneralName::DNSName(n) => {
                            Some((*n).to_string())
                        }
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        assert!(sans.contains(&"example.test".to_string()));
        assert!(sans.contains(&"*.example.test".to_string()));
    }

    #[test]
    fn minting_twice_both_certs_are_independently_valid() {
        let ca = CertificateAuthority::generate().expect("generate ca");
        let a = ca.mint("dup.test").expect("mint a");
        let b = ca.mint("dup.test").expect("mint b");
        // different keys/serials, same hostname - both are legitimate, valid certs
        assert_ne!(a.key_pem, b.key_pem);
        assert!(a.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(b.cert_pem.contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn hostname_with_no_port_suffix_still_mints() {
        let ca = CertificateAuthority::generate().expect("generate ca");
        assert!(ca.mint("no-port-here.test").is_ok());
        let _: Ia5String = "no-port-here.test".try_into().expect("valid dns name");
    }
}
