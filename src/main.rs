fn main() {
    widget_gateway::run();
}
