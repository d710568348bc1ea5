use anyhow::Result;
use avax_tipbot::chain::generate_keypair;

fn main() -> Result<()> {
    let (address, private_key) = generate_keypair();

    println!("Generated new random wallet:");
    println!("Address: {}", address.to_checksum(None));
    println!("Private key: {}", private_key);
    println!("Keep the private key safe and never share it!");

    Ok(())
}
