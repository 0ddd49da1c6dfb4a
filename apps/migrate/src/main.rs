fn main() -> anyhow::Result<()> {
    journey_migrate::run()
}
