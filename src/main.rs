fn main() -> std::process::ExitCode {
    sentinels_lib::run()
}
