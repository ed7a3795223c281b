use std::error::Error;
use std::process::Command;

/// Hardware UUID from `ioreg`.
pub fn get_machine_id() -> Result<String, Box<dyn Error>> {
    ioreg_value("IOPlatformUUID")
}

/// CPU brand string via `sysctl machdep.cpu.brand_string`.
pub fn get_cpu_id() -> Result<String, Box<dyn Error>> {
    let output = Command::new("sysctl")
        .args(["-n", "machdep.cpu.brand_string"])
        .output()?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Platform serial number from `ioreg`.
pub fn get_motherboard_id() -> Result<String, Box<dyn Error>> {
    ioreg_value("IOPlatformSerialNumber")
}

fn ioreg_value(name: &str) -> Result<String, Box<dyn Error>> {
    let output = Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()?;
    let result = String::from_utf8_lossy(&output.stdout);

    let value = result
        .lines()
        .find(|line| line.contains(name))
        .and_then(|line| line.split('=').nth(1))
        .map(|v| v.trim().trim_matches('"').to_string())
        .unwrap_or_default();
    Ok(value)
}
