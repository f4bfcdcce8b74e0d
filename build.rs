fn main() -> shadow_rs::SdResult<()> {
    println!("cargo:rerun-if-changed=migrations");
    shadow_rs::ShadowBuilder::builder().build()?;
    Ok(())
}
