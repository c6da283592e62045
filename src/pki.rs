//! PKI bootstrap (§4.8): generate a self-signed CA and a client/collector
//! leaf certificate pair signed by it. Collaborator tooling only — never
//! runs on the hot transport path.

use std::fs;
use std::path::Path;

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use tracing::info;

use crate::error::{Error, Result};

struct Pem {
    certificate: String,
    private_key: String,
}

fn write_pem(dir: &Path, stem: &str, pem: &Pem, force: bool) -> Result<()> {
    let cert_path = dir.join(format!("{}.crt.pem", stem));
    let key_path = dir.join(format!("{}.key.pem", stem));
    for path in [&cert_path, &key_path] {
        if !force && path.exists() {
            return Err(Error::config(format!(
                "{} already exists, pass --force to overwrite",
                path.display()
            )));
        }
    }
    fs::write(&cert_path, &pem.certificate)?;
    fs::write(&key_path, &pem.private_key)?;
    info!(path = %cert_path.display(), "wrote certificate");
    info!(path = %key_path.display(), "wrote private key");
    Ok(())
}

fn ca_params() -> CertificateParams {
    let mut params = CertificateParams::new(Vec::new()).expect("empty SAN list is always valid");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
        .distinguished_name
        .push(DnType::CommonName, "dlc-agent root CA");
    params
}

fn leaf_params(common_name: &str) -> Result<CertificateParams> {
    let mut params = CertificateParams::new(vec![common_name.to_string()])
        .map_err(|e| Error::config(format!("invalid leaf subject name: {}", e)))?;
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    Ok(params)
}

/// Generate a self-signed CA, then a leaf certificate for each of `names`,
/// signed by that CA. Writes `ca.crt.pem`/`ca.key.pem` plus one
/// `<name>.crt.pem`/`<name>.key.pem` pair per leaf into `out_dir`.
pub fn generate(out_dir: &Path, names: &[&str], force: bool) -> Result<()> {
    fs::create_dir_all(out_dir)?;

    let ca_key_pair = KeyPair::generate().map_err(|e| Error::config(format!("key generation failed: {}", e)))?;
    let ca_cert = ca_params()
        .self_signed(&ca_key_pair)
        .map_err(|e| Error::config(format!("CA self-sign failed: {}", e)))?;

    write_pem(
        out_dir,
        "ca",
        &Pem {
            certificate: ca_cert.pem(),
            private_key: ca_key_pair.serialize_pem(),
        },
        force,
    )?;

    for name in names {
        let leaf_key_pair =
            KeyPair::generate().map_err(|e| Error::config(format!("key generation failed: {}", e)))?;
        let leaf_cert = leaf_params(name)?
            .signed_by(&leaf_key_pair, &ca_cert, &ca_key_pair)
            .map_err(|e| Error::config(format!("leaf sign failed for '{}': {}", name, e)))?;

        write_pem(
            out_dir,
            name,
            &Pem {
                certificate: leaf_cert.pem(),
                private_key: leaf_key_pair.serialize_pem(),
            },
            force,
        )?;
    }

    Ok(())
}
