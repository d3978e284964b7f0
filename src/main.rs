fn main() -> anyhow::Result<()> {
    xocopy::cli::run()
}
