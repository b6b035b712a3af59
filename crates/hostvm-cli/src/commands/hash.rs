//! `hostvm hash` - identifier hashes

use hostvm_sdk::{fnv1a_hash, split_and_hash};

pub fn execute(identifier: &str, split: bool) -> anyhow::Result<()> {
    let hash = fnv1a_hash(identifier);
    println!("{:<12} {:>10}  {:#010x}", identifier, hash, hash);

    if split {
        let call = split_and_hash(identifier)?;
        println!("  class      {:<12} {:#010x}", call.class, call.class_hash);
        println!("  method     {:<12} {:#010x}", call.method, call.method_hash);
    }
    Ok(())
}
