fn main() {
    std::process::exit(apk_installer_lib::run());
}
