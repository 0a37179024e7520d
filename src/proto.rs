pub mod wordtracker {
    tonic::include_proto!("wordtracker");
}
