fn main() {
    moodboard_lib::run()
}
