use std::error::Error;
use std::process::Command;

/// `MachineGuid` from the cryptography registry key.
pub fn get_machine_id() -> Result<String, Box<dyn Error>> {
    let output = Command::new("reg")
        .args([
            "query",
            r"HKLM\SOFTWARE\Microsoft\Cryptography",
            "/v",
            "MachineGuid",
        ])
        .output()?;
    let result = String::from_utf8_lossy(&output.stdout);
    let guid = result
        .lines()
        .find(|line| line.contains("MachineGuid"))
        .and_then(|line| line.split_whitespace().last())
        .unwrap_or("")
        .to_string();
    Ok(guid)
}

pub fn get_cpu_id() -> Result<String, Box<dyn Error>> {
    wmic_value(&["cpu", "get", "ProcessorId"])
}

pub fn get_motherboard_id() -> Result<String, Box<dyn Error>> {
    wmic_value(&["baseboard", "get", "SerialNumber"])
}

fn wmic_value(args: &[&str]) -> Result<String, Box<dyn Error>> {
    let output = Command::new("wmic").args(args).output()?;
    let result = String::from_utf8_lossy(&output.stdout);
    Ok(result.lines().nth(1).unwrap_or("").trim().to_string())
}
