use assert_cmd::Command;

pub fn crmd_bin() -> Command {
    #[allow(deprecated)]
    {
        Command::cargo_bin("crmd").expect("crmd test binary should build")
    }
}
