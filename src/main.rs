fn main() {
    redmine_tracker::run()
}
